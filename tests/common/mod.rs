//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use request_failure_tracker::badge::LogIndicator;
use request_failure_tracker::config::TrackerConfig;
use request_failure_tracker::lifecycle::{bootstrap_with, Shutdown, Tracker};
use request_failure_tracker::storage::MemoryStore;
use serde_json::{json, Value};

/// A tracker over an in-memory backend, with handles for inspection.
pub struct TestTracker {
    pub tracker: Tracker,
    pub backend: Arc<MemoryStore>,
    pub indicator: Arc<LogIndicator>,
    pub shutdown: Shutdown,
}

impl TestTracker {
    pub async fn start() -> Self {
        Self::start_with(TrackerConfig::default(), Arc::new(MemoryStore::new())).await
    }

    pub async fn start_with(config: TrackerConfig, backend: Arc<MemoryStore>) -> Self {
        let indicator = Arc::new(LogIndicator::new());
        let shutdown = Shutdown::new();
        let tracker = bootstrap_with(&config, backend.clone(), indicator.clone(), &shutdown).await;
        Self {
            tracker,
            backend,
            indicator,
            shutdown,
        }
    }

    /// Feed one event, given as JSON, through the listener.
    pub async fn send(&self, event: Value) {
        self.tracker.events.handle_line(&event.to_string()).await;
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.tracker.teardown().await;
    }
}

pub fn send_headers(id: &str, channel: &str, headers: Value) -> Value {
    json!({"event": "sendHeaders", "requestId": id, "channel": channel, "requestHeaders": headers})
}

pub fn headers_received(id: &str, headers: Value) -> Value {
    json!({"event": "headersReceived", "requestId": id, "responseHeaders": headers})
}

pub fn completed(id: &str, url: &str, status: u16) -> Value {
    json!({"event": "completed", "requestId": id, "url": url, "method": "GET", "statusCode": status})
}

pub fn error_occurred(id: &str, url: &str, error: &str) -> Value {
    json!({"event": "errorOccurred", "requestId": id, "url": url, "method": "GET", "error": error})
}
