//! Startup orchestration.
//!
//! # Responsibilities
//! - Open storage and build every subsystem in dependency order
//! - Seed the correlation cache from its durable mirror
//! - Publish the persisted failure count before any event arrives
//! - Start the background flusher
//!
//! # Design Decisions
//! - Only an unopenable storage backend is fatal; a bad mirror or store read
//!   is logged and the tracker starts empty
//! - Listeners are bound by the caller, after bootstrap (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::badge::{CountPublisher, Indicator};
use crate::capture::{EventListener, FailureStore, RecordBuilder};
use crate::commands::{AppState, CommandHandler};
use crate::config::TrackerConfig;
use crate::correlation::{CacheSettings, CorrelationCache};
use crate::lifecycle::Shutdown;
use crate::storage::{self, KeyValueStore, StorageError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),
}

/// Every assembled subsystem of a running tracker.
pub struct Tracker {
    pub storage: Arc<dyn KeyValueStore>,
    pub cache: Arc<CorrelationCache>,
    pub store: Arc<FailureStore>,
    pub publisher: CountPublisher,
    pub events: Arc<EventListener>,
    pub commands: CommandHandler,
    flusher: Option<JoinHandle<()>>,
}

/// Open the configured storage backend and assemble the tracker.
pub async fn bootstrap(
    config: &TrackerConfig,
    indicator: Arc<dyn Indicator>,
    shutdown: &Shutdown,
) -> Result<Tracker, StartupError> {
    let storage = storage::open(&config.storage)?;
    Ok(bootstrap_with(config, storage, indicator, shutdown).await)
}

/// Assemble the tracker over an already open backend.
pub async fn bootstrap_with(
    config: &TrackerConfig,
    storage: Arc<dyn KeyValueStore>,
    indicator: Arc<dyn Indicator>,
    shutdown: &Shutdown,
) -> Tracker {
    let cache = Arc::new(CorrelationCache::new(
        storage.clone(),
        CacheSettings::from_config(&config.storage, &config.capture),
    ));
    if let Err(e) = cache.seed().await {
        tracing::warn!(error = %e, "Could not seed pending correlations; starting empty");
    }

    let store = Arc::new(FailureStore::new(
        storage.clone(),
        config.storage.failures_key.clone(),
        config.capture.capacity,
    ));

    let publisher = CountPublisher::new(indicator);
    publisher.init(&config.badge.color).await;
    match store.len().await {
        Ok(count) => {
            tracing::info!(failures = count, "Loaded failure history");
            publisher.publish(count).await;
        }
        Err(e) => tracing::warn!(error = %e, "Could not read failure history"),
    }

    let flusher = tokio::spawn(cache.clone().run_flusher(shutdown.subscribe()));

    let events = Arc::new(EventListener::new(
        cache.clone(),
        RecordBuilder::new(config.capture.internal_schemes.iter().cloned()),
        store.clone(),
        publisher.clone(),
    ));
    let commands = CommandHandler::new(store.clone(), publisher.clone());

    Tracker {
        storage,
        cache,
        store,
        publisher,
        events,
        commands,
        flusher: Some(flusher),
    }
}

impl Tracker {
    /// State for the command server.
    pub fn app_state(&self) -> AppState {
        AppState {
            commands: self.commands.clone(),
            storage: self.storage.clone(),
            store: self.store.clone(),
            cache: self.cache.clone(),
        }
    }

    /// Wait for the flusher to stop, then write any unflushed correlations.
    ///
    /// Call after triggering shutdown; the flusher only exits on that signal.
    pub async fn teardown(mut self) {
        if let Some(flusher) = self.flusher.take() {
            if let Err(e) = flusher.await {
                tracing::warn!(error = %e, "Correlation flusher ended abnormally");
            }
        }
        self.cache.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::LogIndicator;
    use crate::capture::FailureRecord;
    use crate::correlation::{HeaderChannel, HeaderEntry, RequestId};
    use crate::storage::MemoryStore;

    fn record(n: u64) -> FailureRecord {
        FailureRecord {
            id: format!("r-{}", n),
            url: "https://a.test/".to_string(),
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
    async fn test_bootstrap_publishes_persisted_count() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let config = TrackerConfig::default();
        {
            let seeded = FailureStore::new(backend.clone(), "failedRequests", 500);
            for n in 0..3 {
                seeded.insert(record(n)).await.unwrap();
            }
        }

        let indicator = Arc::new(LogIndicator::new());
        let shutdown = Shutdown::new();
        let tracker = bootstrap_with(&config, backend, indicator.clone(), &shutdown).await;

        assert_eq!(indicator.snapshot().text, "3");
        assert_eq!(indicator.snapshot().color, "#d93025");

        shutdown.trigger();
        tracker.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_flushes_pending_correlations() {
        let backend = Arc::new(MemoryStore::new());
        let config = TrackerConfig::default();
        let shutdown = Shutdown::new();
        let tracker = bootstrap_with(&config, backend.clone(), Arc::new(LogIndicator::new()), &shutdown).await;

        tracker.cache.record_request_headers(
            &RequestId::from("5"),
            HeaderChannel::Primary,
            Some(vec![HeaderEntry::new("X-A", "1")]),
        );
        shutdown.trigger();
        tracker.teardown().await;

        let mirror = backend.get_value("pendingHeaders").await.unwrap().unwrap();
        assert!(mirror.get("5").is_some());
    }
}
