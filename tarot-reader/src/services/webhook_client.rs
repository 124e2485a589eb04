//! Webhook client
//!
//! Generic request/response wrapper around the remote webhook services.
//!
//! # Behavior
//! - Identical calls (same method, URL and serialized payload) inside the
//!   throttle window are refused with `WebhookError::Throttled` and never
//!   reach the network
//! - Bodies are decoded as JSON when the content type says so, otherwise as
//!   text with a second JSON attempt on the text; undecodable text passes
//!   through raw
//! - Every call is written to the `WebhookLog` and to tracing
//! - No retries; retry policy belongs to callers
//!
//! In development, `call_endpoint` can replace a failed call with mock data
//! from a `MockProvider`.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tarot_common::Environment;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::environment::{EnvironmentSettings, WebhookEndpoint};
use super::mock_data::MockProvider;
use super::webhook_log::{CallOutcome, WebhookLog, WebhookLogEntry};

/// Default window during which identical calls are throttled
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("tarot-reader/", env!("CARGO_PKG_VERSION"));

/// HTTP method of a webhook call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Request handed to a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub payload: Value,
}

/// Raw response from a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Transport-level failure (connection refused, timeout, ...)
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Network seam of the webhook client
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.http_client.get(&request.url),
            HttpMethod::Post => self.http_client.post(&request.url).json(&request.payload),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookBody {
    Json(Value),
    Text(String),
    Empty,
}

/// Successful webhook reply
#[derive(Debug, Clone)]
pub struct WebhookReply {
    pub status: u16,
    pub body: WebhookBody,
    /// True when the body was produced by the mock provider
    pub mocked: bool,
}

/// Webhook client errors
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Throttled: identical request made within the last {0:?}")]
    Throttled(Duration),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl WebhookError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, WebhookError::Throttled(_))
    }
}

/// Per-signature soft rate limit
struct Throttle {
    window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    fn new(window: Duration) -> Self {
        Self {
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Records the signature and returns true when the call may proceed
    fn try_acquire(&self, signature: String) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.retain(|_, at| now.duration_since(*at) < self.window);

        if recent.contains_key(&signature) {
            return false;
        }
        recent.insert(signature, now);
        true
    }
}

fn throttle_signature(method: HttpMethod, url: &str, payload: &Value) -> String {
    format!("{} {} {}", method.as_str(), url, payload)
}

/// Decode a body: JSON by content type, else text, then JSON-from-text
fn decode_body(content_type: Option<&str>, body: String) -> WebhookBody {
    if body.trim().is_empty() {
        return WebhookBody::Empty;
    }

    let declared_json = content_type.is_some_and(|ct| ct.contains("json"));
    if declared_json {
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            return WebhookBody::Json(value);
        }
    }

    match serde_json::from_str::<Value>(body.trim()) {
        Ok(value) => WebhookBody::Json(value),
        Err(_) => WebhookBody::Text(body),
    }
}

/// Webhook client with throttling, logging and mock fallback
pub struct WebhookClient {
    transport: Arc<dyn WebhookTransport>,
    throttle: Throttle,
    log: Arc<WebhookLog>,
    environment: Arc<EnvironmentSettings>,
    mocks: Option<Arc<dyn MockProvider>>,
}

impl WebhookClient {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        environment: Arc<EnvironmentSettings>,
        log: Arc<WebhookLog>,
        throttle_window: Duration,
    ) -> Self {
        Self {
            transport,
            throttle: Throttle::new(throttle_window),
            log,
            environment,
            mocks: None,
        }
    }

    /// Enable mock-data fallback for failed calls in development
    pub fn with_mock_provider(mut self, mocks: Arc<dyn MockProvider>) -> Self {
        self.mocks = Some(mocks);
        self
    }

    pub fn log(&self) -> &Arc<WebhookLog> {
        &self.log
    }

    pub fn environment(&self) -> &Arc<EnvironmentSettings> {
        &self.environment
    }

    /// Perform one logical webhook call
    pub async fn call_webhook(
        &self,
        url: &str,
        payload: &Value,
        environment: Environment,
        method: HttpMethod,
    ) -> Result<WebhookReply, WebhookError> {
        let mut entry = WebhookLogEntry::begin(method.as_str(), url, environment.as_str(), payload);

        if !self
            .throttle
            .try_acquire(throttle_signature(method, url, payload))
        {
            debug!(url, "Webhook call throttled");
            entry.outcome = CallOutcome::Throttled;
            let error = WebhookError::Throttled(self.throttle.window);
            entry.error = Some(error.to_string());
            self.log.record(entry);
            return Err(error);
        }

        debug!(url, method = method.as_str(), %environment, "Calling webhook");
        let started = Instant::now();
        let result = self
            .transport
            .send(TransportRequest {
                method,
                url: url.to_string(),
                payload: payload.clone(),
            })
            .await;
        entry.duration_ms = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Webhook transport failure");
                entry.outcome = CallOutcome::TransportError;
                entry.error = Some(e.to_string());
                self.log.record(entry);
                return Err(WebhookError::Transport(e.0));
            }
        };

        entry.status = Some(response.status);
        let entry = entry.with_response(&response.body);

        if !(200..300).contains(&response.status) {
            let message = if response.body.trim().is_empty() {
                "request failed".to_string()
            } else {
                response.body.trim().chars().take(200).collect()
            };
            let error = WebhookError::Http {
                status: response.status,
                message,
            };
            warn!(url, status = response.status, "Webhook returned error status");
            self.log.record(WebhookLogEntry {
                outcome: CallOutcome::HttpError,
                error: Some(error.to_string()),
                ..entry
            });
            return Err(error);
        }

        info!(url, status = response.status, duration_ms = entry.duration_ms, "Webhook call succeeded");
        self.log.record(entry);

        Ok(WebhookReply {
            status: response.status,
            body: decode_body(response.content_type.as_deref(), response.body),
            mocked: false,
        })
    }

    /// Call a named endpoint in the active environment
    ///
    /// In development, a failed (non-throttled) call falls back to mock data
    /// when a provider is configured.
    pub async fn call_endpoint(
        &self,
        endpoint: WebhookEndpoint,
        payload: &Value,
    ) -> Result<WebhookReply, WebhookError> {
        let environment = self.environment.current();
        let url = self.environment.url_for(endpoint);

        let error = match self
            .call_webhook(&url, payload, environment, HttpMethod::Post)
            .await
        {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        if error.is_throttled() || environment.is_production() {
            return Err(error);
        }

        let Some(mock) = self
            .mocks
            .as_ref()
            .and_then(|m| m.mock_reply(endpoint, payload))
        else {
            return Err(error);
        };

        warn!(
            endpoint = endpoint.as_str(),
            error = %error,
            "Webhook failed in development, continuing with mock data"
        );
        let mut entry = WebhookLogEntry::begin("POST", &url, environment.as_str(), payload)
            .with_response(&mock.to_string());
        entry.outcome = CallOutcome::MockFallback;
        entry.error = Some(error.to_string());
        self.log.record(entry);

        Ok(WebhookReply {
            status: 200,
            body: WebhookBody::Json(mock),
            mocked: true,
        })
    }
}
