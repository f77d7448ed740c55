//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeFeed, KeyValueStore, StorageChange, StorageError, StorageResult};

/// An in-memory [`KeyValueStore`].
///
/// Counts completed writes so callers can observe write amplification, and can
/// be switched offline to simulate an unavailable backend.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    feed: ChangeFeed,
    writes: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            feed: ChangeFeed::new(),
            writes: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Number of `set`/`remove` calls that completed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map still holds whole values; keep serving it.
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>> {
        self.check_online()?;
        let values = self.lock();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        self.check_online()?;
        let changes: Vec<_> = {
            let mut values = self.lock();
            entries
                .into_iter()
                .map(|(key, value)| {
                    let old = values.insert(key.clone(), value.clone());
                    (key, old, Some(value))
                })
                .collect()
        };
        self.writes.fetch_add(1, Ordering::SeqCst);

        for (key, old, new) in changes {
            self.feed.emit(&key, old, new);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StorageResult<()> {
        self.check_online()?;
        let changes: Vec<_> = {
            let mut values = self.lock();
            keys.iter()
                .map(|key| (key.to_string(), values.remove(*key)))
                .collect()
        };
        self.writes.fetch_add(1, Ordering::SeqCst);

        for (key, old) in changes {
            self.feed.emit(&key, old, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
