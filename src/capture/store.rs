//! Bounded, newest-first failure history.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::capture::record::FailureRecord;
use crate::storage::{KeyValueStore, StorageResult};

/// Persistent list of the most recent failures, newest at index 0.
///
/// Every operation is a full read-modify-write of one storage key, serialized
/// by an async mutex so concurrent inserts never drop each other.
pub struct FailureStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    lock: Mutex<()>,
}

impl FailureStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            storage,
            key: key.into(),
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend `record`, dropping the oldest beyond capacity. Returns the new size.
    pub async fn insert(&self, record: FailureRecord) -> StorageResult<usize> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        records.insert(0, record);
        records.truncate(self.capacity);
        let len = records.len();
        self.storage
            .set_value(&self.key, serde_json::to_value(&records)?)
            .await?;
        Ok(len)
    }

    /// Current list, newest first.
    pub async fn list(&self) -> StorageResult<Vec<FailureRecord>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Replace the list with an empty one.
    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        self.storage
            .set_value(&self.key, Value::Array(Vec::new()))
            .await
    }

    pub async fn len(&self) -> StorageResult<usize> {
        Ok(self.list().await?.len())
    }

    /// Caller must hold `lock`.
    async fn read(&self) -> StorageResult<Vec<FailureRecord>> {
        let mut records = match self.storage.get_value(&self.key).await? {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping undecodable failure record");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                tracing::warn!(value = %other, "Failure history is not a list; treating as empty");
                Vec::new()
            }
        };
        records.truncate(self.capacity);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn record(n: u64) -> FailureRecord {
        FailureRecord {
            id: format!("{}-{}", n, n),
            url: format!("https://a.test/{}", n),
            method: "GET".to_string(),
            status_code: Some(500),
            error_description: "HTTP 500".to_string(),
            timestamp: n,
            resource_type: None,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            initiator: None,
            tab_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_is_newest_first_and_bounded() {
        let store = FailureStore::new(Arc::new(MemoryStore::new()), "failedRequests", 3);
        for n in 1..=5 {
            store.insert(record(n)).await.unwrap();
        }

        let list = store.list().await.unwrap();
        let timestamps: Vec<u64> = list.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_missing_key_reads_empty() {
        let store = FailureStore::new(Arc::new(MemoryStore::new()), "failedRequests", 500);
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_writes_empty_list() {
        let backend = Arc::new(MemoryStore::new());
        let store = FailureStore::new(backend.clone(), "failedRequests", 500);
        store.insert(record(1)).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(
            backend.get_value("failedRequests").await.unwrap(),
            Some(Value::Array(vec![]))
        );
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_history_is_truncated_on_read() {
        let backend = Arc::new(MemoryStore::new());
        let records: Vec<FailureRecord> = (1..=4).map(record).collect();
        backend
            .set_value("failedRequests", serde_json::to_value(&records).unwrap())
            .await
            .unwrap();

        let store = FailureStore::new(backend, "failedRequests", 2);
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.insert(record(9)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_not_lost() {
        let store = Arc::new(FailureStore::new(Arc::new(MemoryStore::new()), "failedRequests", 500));
        let handles: Vec<_> = (0..20)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(record(n)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 20);
    }
}
