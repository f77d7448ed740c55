//! Durable key-value storage subsystem.
//!
//! # Data Flow
//! ```text
//! correlation cache / bounded store
//!     → KeyValueStore::get / set / remove (one namespace)
//!     → memory.rs (process-local map) or file.rs (JSON file, atomic replace)
//!     → StorageChange broadcast (key, old, new, area)
//!     → downstream subscribers (command server SSE feed)
//! ```
//!
//! # Design Decisions
//! - Values are untyped JSON; callers own their schemas
//! - Every successful write emits one change per key whose value changed
//! - Writes replace whole values; there is no partial update

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::StorageConfig;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage area reported with every change notification.
pub const LOCAL_AREA: &str = "local";

const CHANGE_FEED_CAPACITY: usize = 256;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or replacing the backing file failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(String),

    /// The backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A change to one key, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub area: String,
}

/// A namespaced, asynchronous key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the given keys. Missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>>;

    /// Write every entry of `entries`, replacing existing values.
    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()>;

    /// Delete the given keys. Missing keys are ignored.
    async fn remove(&self, keys: &[&str]) -> StorageResult<()>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;

    /// Fetch a single key.
    async fn get_value(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.get(&[key]).await?.remove(key))
    }

    /// Write a single key.
    async fn set_value(&self, key: &str, value: Value) -> StorageResult<()> {
        self.set(HashMap::from([(key.to_string(), value)])).await
    }
}

/// Broadcasts storage changes to any number of subscribers.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StorageChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.tx.subscribe()
    }

    /// Publish a change unless the value is unchanged.
    pub(crate) fn emit(&self, key: &str, old_value: Option<Value>, new_value: Option<Value>) {
        if old_value == new_value {
            return;
        }
        // No subscribers is not an error.
        let _ = self.tx.send(StorageChange {
            key: key.to_string(),
            old_value,
            new_value,
            area: LOCAL_AREA.to_string(),
        });
    }
}

/// Open the backend described by `config`.
///
/// A configured path selects the JSON file backend; otherwise state lives in
/// memory and does not survive a restart.
pub fn open(config: &StorageConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    match &config.path {
        Some(path) => {
            let store = FileStore::open(path)?;
            tracing::info!(path = %path.display(), "Using file-backed storage");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No storage path configured; failure history will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
