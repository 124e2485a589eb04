//! Session store
//!
//! Key/value cache for client-visible state (environment choice, mock
//! identity, current reading, debug logs). Values are JSON. When opened with a
//! file path the contents are mirrored to that file so state survives
//! restarts; none of it is required for the coordinator to be correct.
//!
//! Writes only mark the mirror dirty. The writer task started by
//! [`SessionStore::spawn_writer`] batches them and writes the file on the
//! blocking pool; [`SessionStore::flush`] writes synchronously (shutdown).

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Default batching window of the mirror writer
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Well-known store keys
pub mod keys {
    pub const APP_ENVIRONMENT: &str = "appEnvironment";
    pub const MOCK_USER_ID: &str = "mockUserId";
    pub const MOCK_RUNS_TODAY: &str = "mockRunsToday";
    pub const CURRENT_READING: &str = "currentReading";
    pub const REVEALED_CARDS: &str = "revealedCards";
    pub const WEBHOOK_LOGS: &str = "webhook_logs";
    pub const CONNECTION_LOGS: &str = "connectionLogs";

    /// Keys cleared by a reading reset
    pub const READING_KEYS: [&str; 2] = [CURRENT_READING, REVEALED_CARDS];
}

/// File mirror bookkeeping
struct Mirror {
    path: PathBuf,
    dirty: AtomicBool,
    changed: Notify,
    /// Serializes snapshot + write so the file never goes backwards
    write_lock: Mutex<()>,
}

/// JSON key/value store, optionally mirrored to disk
pub struct SessionStore {
    values: Mutex<BTreeMap<String, Value>>,
    mirror: Option<Mirror>,
}

impl SessionStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            values: Mutex::new(BTreeMap::new()),
            mirror: None,
        }
    }

    /// Store mirrored to `path`, loading existing content if present
    pub fn open(path: &Path) -> tarot_common::Result<Self> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = values.len(), "Session store opened");

        Ok(Self {
            values: Mutex::new(values),
            mirror: Some(Mirror {
                path: path.to_path_buf(),
                dirty: AtomicBool::new(false),
                changed: Notify::new(),
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Typed read; values that fail to decode are treated as absent
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable session store value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode session store value");
                return;
            }
        };
        self.values.lock().insert(key.to_string(), value);
        self.mark_dirty();
    }

    pub fn remove(&self, key: &str) {
        self.remove_many(&[key]);
    }

    pub fn remove_many(&self, keys: &[&str]) {
        let changed = {
            let mut values = self.values.lock();
            let mut changed = false;
            for key in keys {
                changed |= values.remove(*key).is_some();
            }
            changed
        };
        if changed {
            self.mark_dirty();
        }
    }

    /// Append to a JSON array value, keeping at most `cap` newest entries
    pub fn append_capped<T: Serialize>(&self, key: &str, entry: &T, cap: usize) {
        let entry = match serde_json::to_value(entry) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode session store entry");
                return;
            }
        };
        {
            let mut values = self.values.lock();
            let slot = values
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                items.push(entry);
                if items.len() > cap {
                    let excess = items.len() - cap;
                    items.drain(..excess);
                }
            }
        }
        self.mark_dirty();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }

    fn mark_dirty(&self) {
        if let Some(mirror) = &self.mirror {
            mirror.dirty.store(true, Ordering::Release);
            mirror.changed.notify_one();
        }
    }

    /// Write the mirror file now if anything changed since the last write
    pub fn flush(&self) -> tarot_common::Result<()> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        let _write = mirror.write_lock.lock();
        if !mirror.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&*self.values.lock())?;
        if let Err(e) = std::fs::write(&mirror.path, json) {
            mirror.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    /// Start the task that writes the mirror file, batching changes made
    /// within `interval`
    ///
    /// Returns `None` for in-memory stores. Must be called from within a tokio
    /// runtime.
    pub fn spawn_writer(self: &Arc<Self>, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
        let path = self.mirror.as_ref()?.path.clone();
        let store = Arc::clone(self);

        info!(path = %path.display(), interval_ms = interval.as_millis() as u64, "Session store writer started");
        Some(tokio::spawn(async move {
            let Some(mirror) = &store.mirror else {
                return;
            };
            loop {
                mirror.changed.notified().await;
                tokio::time::sleep(interval).await;

                let writer = store.clone();
                match tokio::task::spawn_blocking(move || writer.flush()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "Failed to persist session store")
                    }
                    Err(e) => warn!(error = %e, "Session store writer task failed"),
                }
            }
        }))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let store = SessionStore::in_memory();
        store.set(keys::MOCK_USER_ID, &"mock-user-1");
        assert_eq!(store.get_as::<String>(keys::MOCK_USER_ID).as_deref(), Some("mock-user-1"));

        store.remove(keys::MOCK_USER_ID);
        assert!(!store.contains(keys::MOCK_USER_ID));
    }

    #[test]
    fn test_reading_keys_cleared_together() {
        let store = SessionStore::in_memory();
        store.set(keys::CURRENT_READING, &json!({"phase": "reading"}));
        store.set(keys::REVEALED_CARDS, &vec!["the-fool"]);
        store.set(keys::APP_ENVIRONMENT, &"production");

        store.remove_many(&keys::READING_KEYS);

        assert!(!store.contains(keys::CURRENT_READING));
        assert!(!store.contains(keys::REVEALED_CARDS));
        assert!(store.contains(keys::APP_ENVIRONMENT));
    }

    #[test]
    fn test_append_capped_keeps_newest() {
        let store = SessionStore::in_memory();
        for i in 0..5 {
            store.append_capped(keys::CONNECTION_LOGS, &i, 3);
        }
        assert_eq!(store.get(keys::CONNECTION_LOGS), Some(json!([2, 3, 4])));
    }

    #[test]
    fn test_file_mirror_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = SessionStore::open(&path).unwrap();
            store.set(keys::MOCK_RUNS_TODAY, &true);
            assert!(!path.exists());
            store.flush().unwrap();
        }

        let reopened = SessionStore::open(&path).unwrap();
        assert_eq!(reopened.get_as::<bool>(keys::MOCK_RUNS_TODAY), Some(true));
    }

    #[test]
    fn test_flush_without_changes_leaves_file_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store = SessionStore::open(&path).unwrap();
        store.flush().unwrap();
        assert!(!path.exists());

        store.remove(keys::CURRENT_READING);
        store.flush().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_writer_batches_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(SessionStore::open(&path).unwrap());
        let writer = store.spawn_writer(Duration::from_millis(300)).unwrap();

        store.set(keys::MOCK_USER_ID, &"mock-user-1");
        store.set(keys::MOCK_RUNS_TODAY, &false);
        assert!(!path.exists());

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let stored: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored[keys::MOCK_USER_ID], "mock-user-1");
        assert_eq!(stored[keys::MOCK_RUNS_TODAY], false);

        writer.abort();
    }

    #[test]
    fn test_in_memory_store_has_no_writer() {
        let store = Arc::new(SessionStore::in_memory());
        assert!(store.spawn_writer(DEFAULT_FLUSH_INTERVAL).is_none());
        store.set(keys::MOCK_USER_ID, &"x");
        store.flush().unwrap();
    }

    #[test]
    fn test_undecodable_value_reads_as_absent() {
        let store = SessionStore::in_memory();
        store.set(keys::MOCK_RUNS_TODAY, &"not-a-bool");
        assert_eq!(store.get_as::<bool>(keys::MOCK_RUNS_TODAY), None);
    }
}
