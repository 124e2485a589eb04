//! Development mock data
//!
//! Stand-in replies used when a webhook is unreachable in development. The
//! mock identity is remembered in the session store (`mockUserId`,
//! `mockRunsToday`) so it stays stable across calls.

use rand::seq::index::sample;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::environment::WebhookEndpoint;
use super::session_store::{keys, SessionStore};

/// Number of cards mock readings draw from
const MOCK_DECK_SIZE: usize = 22;

const MOCK_MESSAGE: &str = "The cards speak of movement. What was held back is \
ready to flow, and the path ahead rewards patience over haste.";

/// Source of replacement payloads for failed development calls
pub trait MockProvider: Send + Sync {
    /// Mock body for `endpoint`, or `None` when no mock exists
    fn mock_reply(&self, endpoint: WebhookEndpoint, payload: &Value) -> Option<Value>;
}

/// Mock provider backed by the session store
pub struct StoreMockProvider {
    store: Arc<SessionStore>,
}

impl StoreMockProvider {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    fn mock_user_id(&self) -> String {
        if let Some(id) = self.store.get_as::<String>(keys::MOCK_USER_ID) {
            return id;
        }
        let id = format!("mock-{}", Uuid::new_v4().simple());
        self.store.set(keys::MOCK_USER_ID, &id);
        id
    }

    fn mock_runs_today(&self) -> bool {
        self.store
            .get_as::<bool>(keys::MOCK_RUNS_TODAY)
            .unwrap_or(false)
    }
}

impl MockProvider for StoreMockProvider {
    fn mock_reply(&self, endpoint: WebhookEndpoint, payload: &Value) -> Option<Value> {
        match endpoint {
            WebhookEndpoint::Reading => {
                let mut rng = rand::thread_rng();
                let indices = sample(&mut rng, MOCK_DECK_SIZE, 3).into_vec();
                let mut reply = json!({
                    "selected_cards": indices,
                    "message": MOCK_MESSAGE,
                });
                if let Some(intention) = payload.get("intention").and_then(Value::as_str) {
                    reply["question"] = Value::String(intention.to_string());
                }
                Some(reply)
            }
            WebhookEndpoint::Login => Some(json!({
                "userid": self.mock_user_id(),
                "runs_today": self.mock_runs_today(),
            })),
            WebhookEndpoint::DeckSelect => Some(json!({ "success": true })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mock_reading_has_three_distinct_indices() {
        let provider = StoreMockProvider::new(Arc::new(SessionStore::in_memory()));
        let reply = provider
            .mock_reply(WebhookEndpoint::Reading, &json!({"intention": "Will it rain?"}))
            .unwrap();

        let indices: Vec<u64> = reply["selected_cards"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        assert_eq!(indices.len(), 3);
        assert!(indices.iter().all(|&i| i < MOCK_DECK_SIZE as u64));
        assert_eq!(indices.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(reply["question"], "Will it rain?");
    }

    #[test]
    fn test_mock_login_identity_is_stable() {
        let store = Arc::new(SessionStore::in_memory());
        let provider = StoreMockProvider::new(store.clone());

        let first = provider.mock_reply(WebhookEndpoint::Login, &json!({})).unwrap();
        let second = provider.mock_reply(WebhookEndpoint::Login, &json!({})).unwrap();

        assert_eq!(first["userid"], second["userid"]);
        assert_eq!(first["runs_today"], false);
        assert!(store.contains(keys::MOCK_USER_ID));
    }

    #[test]
    fn test_mock_runs_today_from_store() {
        let store = Arc::new(SessionStore::in_memory());
        store.set(keys::MOCK_RUNS_TODAY, &true);
        store.set(keys::MOCK_USER_ID, &"fixed-user");
        let provider = StoreMockProvider::new(store);

        let reply = provider.mock_reply(WebhookEndpoint::Login, &json!({})).unwrap();
        assert_eq!(reply["userid"], "fixed-user");
        assert_eq!(reply["runs_today"], true);
    }
}
