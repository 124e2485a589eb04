//! Webhook call log
//!
//! Bounded in-memory record of every webhook call (success, failure,
//! throttle, mock fallback) with request and response snapshots, kept for
//! later inspection. Entries are also mirrored to the session store under
//! `webhook_logs`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use super::session_store::{keys, SessionStore};

/// Response snapshots longer than this are truncated
const MAX_SNAPSHOT_CHARS: usize = 2_000;

/// How a logged call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    HttpError,
    TransportError,
    Throttled,
    MockFallback,
}

/// One logged webhook call
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub environment: String,
    pub request: Value,
    pub outcome: CallOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl WebhookLogEntry {
    /// Entry skeleton for a call about to be made
    pub fn begin(method: &str, url: &str, environment: &str, request: &Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: method.to_string(),
            url: url.to_string(),
            environment: environment.to_string(),
            request: request.clone(),
            outcome: CallOutcome::Success,
            status: None,
            response: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn with_response(mut self, text: &str) -> Self {
        self.response = Some(truncate(text));
        self
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_SNAPSHOT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_SNAPSHOT_CHARS).collect();
    cut.push('…');
    cut
}

/// Bounded webhook log
pub struct WebhookLog {
    entries: Mutex<VecDeque<WebhookLogEntry>>,
    capacity: usize,
    store: Option<Arc<SessionStore>>,
}

impl WebhookLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            store: None,
        }
    }

    /// Mirror every recorded entry into the session store
    pub fn with_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn record(&self, entry: WebhookLogEntry) {
        if let Some(store) = &self.store {
            store.append_capped(keys::WEBHOOK_LOGS, &entry, self.capacity);
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<WebhookLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        if let Some(store) = &self.store {
            store.remove(keys::WEBHOOK_LOGS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(url: &str) -> WebhookLogEntry {
        WebhookLogEntry::begin("POST", url, "development", &json!({"userid": "u1"}))
    }

    #[test]
    fn test_log_is_bounded_oldest_dropped() {
        let log = WebhookLog::new(2);
        log.record(entry("http://a"));
        log.record(entry("http://b"));
        log.record(entry("http://c"));

        let urls: Vec<_> = log.entries().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["http://b", "http://c"]);
    }

    #[test]
    fn test_response_snapshot_truncated() {
        let long = "x".repeat(MAX_SNAPSHOT_CHARS + 50);
        let e = entry("http://a").with_response(&long);
        let snapshot = e.response.expect("snapshot");
        assert_eq!(snapshot.chars().count(), MAX_SNAPSHOT_CHARS + 1);
        assert!(snapshot.ends_with('…'));
    }

    #[test]
    fn test_mirrors_into_store() {
        let store = Arc::new(SessionStore::in_memory());
        let log = WebhookLog::new(5).with_store(store.clone());
        log.record(entry("http://a"));

        let mirrored = store.get(keys::WEBHOOK_LOGS).expect("mirrored logs");
        assert_eq!(mirrored.as_array().map(Vec::len), Some(1));

        log.clear();
        assert!(log.is_empty());
        assert!(!store.contains(keys::WEBHOOK_LOGS));
    }
}
