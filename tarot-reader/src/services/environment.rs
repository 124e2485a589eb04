//! Webhook environment selection
//!
//! Holds the development and production URL sets and the currently active
//! environment. Switching emits `EnvironmentChanged` so listeners can react,
//! and the choice is remembered in the session store.

use parking_lot::RwLock;
use std::sync::Arc;
use tarot_common::config::{WebhookConfig, WebhookUrls};
use tarot_common::events::{EventBus, TarotEvent};
use tarot_common::Environment;
use tracing::info;

use super::session_store::{keys, SessionStore};

/// Remote webhook kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEndpoint {
    Reading,
    DeckSelect,
    Login,
}

impl WebhookEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEndpoint::Reading => "reading",
            WebhookEndpoint::DeckSelect => "deck_select",
            WebhookEndpoint::Login => "login",
        }
    }
}

/// Active environment plus both URL sets
pub struct EnvironmentSettings {
    current: RwLock<Environment>,
    webhooks: WebhookConfig,
    event_bus: EventBus,
    store: Arc<SessionStore>,
}

impl EnvironmentSettings {
    /// Create settings, preferring a previously stored environment over `initial`
    pub fn new(
        initial: Environment,
        webhooks: WebhookConfig,
        event_bus: EventBus,
        store: Arc<SessionStore>,
    ) -> Self {
        let current = store
            .get_as::<Environment>(keys::APP_ENVIRONMENT)
            .unwrap_or(initial);

        Self {
            current: RwLock::new(current),
            webhooks,
            event_bus,
            store,
        }
    }

    pub fn current(&self) -> Environment {
        *self.current.read()
    }

    /// Switch environment; emits `EnvironmentChanged` only on an actual change
    pub fn set(&self, environment: Environment) {
        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, environment)
        };

        self.store.set(keys::APP_ENVIRONMENT, &environment);

        if previous != environment {
            info!(from = %previous, to = %environment, "Webhook environment changed");
            self.event_bus.emit_lossy(TarotEvent::EnvironmentChanged {
                environment,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// URL set of the active environment
    pub fn urls(&self) -> &WebhookUrls {
        self.webhooks.urls(self.current())
    }

    /// URL of one endpoint in the active environment
    pub fn url_for(&self, endpoint: WebhookEndpoint) -> String {
        let urls = self.urls();
        match endpoint {
            WebhookEndpoint::Reading => urls.reading.clone(),
            WebhookEndpoint::DeckSelect => urls.deck_select.clone(),
            WebhookEndpoint::Login => urls.login.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(bus: &EventBus, store: Arc<SessionStore>) -> EnvironmentSettings {
        EnvironmentSettings::new(
            Environment::Development,
            WebhookConfig::default(),
            bus.clone(),
            store,
        )
    }

    #[test]
    fn test_switch_swaps_url_set_and_emits() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let env = settings(&bus, Arc::new(SessionStore::in_memory()));

        let dev_url = env.url_for(WebhookEndpoint::Reading);
        env.set(Environment::Production);

        assert_eq!(env.current(), Environment::Production);
        assert_ne!(env.url_for(WebhookEndpoint::Reading), dev_url);
        assert_eq!(rx.try_recv().expect("event").event_type(), "EnvironmentChanged");
    }

    #[test]
    fn test_setting_same_environment_is_silent() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let env = settings(&bus, Arc::new(SessionStore::in_memory()));

        env.set(Environment::Development);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stored_environment_wins_over_initial() {
        let store = Arc::new(SessionStore::in_memory());
        store.set(keys::APP_ENVIRONMENT, &Environment::Production);

        let env = settings(&EventBus::new(10), store);
        assert_eq!(env.current(), Environment::Production);
    }
}
