//! tarot-reader library interface
//!
//! Exposes the reading coordinator services and the HTTP router for
//! integration testing.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tarot_common::config::TomlConfig;
use tarot_common::events::EventBus;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::services::session_store::DEFAULT_FLUSH_INTERVAL;
use crate::services::{
    spawn_event_listener, AccountService, DeckCatalog, EnvironmentSettings, ReadingCoordinator,
    ReadingRequestRegistry, SessionStore, StoreMockProvider, WebhookClient, WebhookLog,
    WebhookTransport,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The live reading session
    pub coordinator: Arc<Mutex<ReadingCoordinator>>,
    pub registry: Arc<ReadingRequestRegistry>,
    pub environment: Arc<EnvironmentSettings>,
    pub webhook_log: Arc<WebhookLog>,
    pub catalog: Arc<DeckCatalog>,
    /// Client-visible state, mirrored to `state_file` when configured
    pub store: Arc<SessionStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Delay between starting a reading and showing the card pool
    pub preparation_delay: Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire every service from configuration over the given transport
    pub fn new(
        config: &TomlConfig,
        transport: Arc<dyn WebhookTransport>,
    ) -> tarot_common::Result<Self> {
        let store = Arc::new(match &config.state_file {
            Some(path) => SessionStore::open(path)?,
            None => SessionStore::in_memory(),
        });

        let event_bus = EventBus::new(config.event_capacity.max(1));
        let environment = Arc::new(EnvironmentSettings::new(
            config.environment,
            config.webhooks.clone(),
            event_bus.clone(),
            store.clone(),
        ));
        let webhook_log =
            Arc::new(WebhookLog::new(config.webhook_log_capacity).with_store(store.clone()));

        let mut client = WebhookClient::new(
            transport,
            environment.clone(),
            webhook_log.clone(),
            Duration::from_secs(config.throttle_window_secs),
        );
        if config.mock_fallback {
            client = client.with_mock_provider(Arc::new(StoreMockProvider::new(store.clone())));
        }
        let client = Arc::new(client);

        let catalog = Arc::new(DeckCatalog::builtin());
        let registry = Arc::new(ReadingRequestRegistry::new(
            client.clone(),
            catalog.clone(),
            event_bus.clone(),
        ));
        let accounts = Arc::new(AccountService::new(client));

        let coordinator = ReadingCoordinator::new(
            registry.clone(),
            accounts,
            environment.clone(),
            store.clone(),
            event_bus.clone(),
        );

        info!(
            environment = %environment.current(),
            decks = catalog.decks().count(),
            mock_fallback = config.mock_fallback,
            "Application state initialized"
        );

        Ok(Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
            registry,
            environment,
            webhook_log,
            catalog,
            store,
            event_bus,
            preparation_delay: Duration::from_millis(config.preparation_delay_ms),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }

    /// Forward pipeline events to the coordinator
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_event_listener(&self) -> tokio::task::JoinHandle<()> {
        spawn_event_listener(self.coordinator.clone(), self.registry.subscribe())
    }

    /// Write the state file in the background, batching changes
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_store_writer(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.store.spawn_writer(DEFAULT_FLUSH_INTERVAL)
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::deck_routes())
        .merge(api::environment_routes())
        .merge(api::wallet_routes())
        .merge(api::reading_routes())
        .merge(api::webhook_log_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
