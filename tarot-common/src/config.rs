//! Configuration loading and environment selection
//!
//! Bootstrap configuration is a TOML file resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TAROT_CONFIG`)
//! 3. Platform config directory (`<config_dir>/tarot/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable file never aborts startup: a warning is logged and
//! defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TAROT_CONFIG";

/// Webhook environment
///
/// Selects which webhook URL set is used. Development additionally allows
/// mock-data fallback when a webhook call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::InvalidInput(format!("Unknown environment: {}", other))),
        }
    }
}

/// Webhook URLs for one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookUrls {
    /// Reading webhook (returns selected card indices + message)
    pub reading: String,
    /// Deck selection webhook
    pub deck_select: String,
    /// Wallet login webhook
    pub login: String,
}

impl WebhookUrls {
    fn development_defaults() -> Self {
        Self {
            reading: "http://localhost:5678/webhook-test/reading".to_string(),
            deck_select: "http://localhost:5678/webhook-test/deck-select".to_string(),
            login: "http://localhost:5678/webhook-test/login".to_string(),
        }
    }

    fn production_defaults() -> Self {
        Self {
            reading: "http://localhost:5678/webhook/reading".to_string(),
            deck_select: "http://localhost:5678/webhook/deck-select".to_string(),
            login: "http://localhost:5678/webhook/login".to_string(),
        }
    }
}

/// URL sets for both environments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "WebhookUrls::development_defaults")]
    pub development: WebhookUrls,
    #[serde(default = "WebhookUrls::production_defaults")]
    pub production: WebhookUrls,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            development: WebhookUrls::development_defaults(),
            production: WebhookUrls::production_defaults(),
        }
    }
}

impl WebhookConfig {
    /// URL set for the given environment
    pub fn urls(&self, environment: Environment) -> &WebhookUrls {
        match environment {
            Environment::Development => &self.development,
            Environment::Production => &self.production,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Initial webhook environment
    #[serde(default)]
    pub environment: Environment,

    /// Window during which identical webhook calls are throttled
    #[serde(default = "default_throttle_window_secs")]
    pub throttle_window_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of webhook log entries retained
    #[serde(default = "default_webhook_log_capacity")]
    pub webhook_log_capacity: usize,

    /// EventBus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Delay between Preparing and Selection (card shuffle)
    #[serde(default = "default_preparation_delay_ms")]
    pub preparation_delay_ms: u64,

    /// Substitute mock data for failed webhook calls in development
    #[serde(default = "default_mock_fallback")]
    pub mock_fallback: bool,

    /// Optional JSON file mirroring the session store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    // Tables must follow plain values in TOML output
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub webhooks: WebhookConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            environment: Environment::default(),
            throttle_window_secs: default_throttle_window_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            webhook_log_capacity: default_webhook_log_capacity(),
            event_capacity: default_event_capacity(),
            preparation_delay_ms: default_preparation_delay_ms(),
            mock_fallback: default_mock_fallback(),
            state_file: None,
            logging: LoggingConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:5740".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_throttle_window_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_webhook_log_capacity() -> usize {
    100
}

fn default_event_capacity() -> usize {
    100
}

fn default_preparation_delay_ms() -> u64 {
    1500
}

fn default_mock_fallback() -> bool {
    true
}

/// Resolve the config file path
///
/// Returns `None` when no candidate exists; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("tarot").join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed for {}: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// Missing or malformed files produce a warning and compiled defaults.
pub fn load_config(cli_arg: Option<&Path>) -> TomlConfig {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load config ({}), using compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write configuration to a TOML file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
