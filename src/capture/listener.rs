//! Lifecycle event dispatch.
//!
//! # Responsibilities
//! - Route header events into the correlation cache
//! - Turn terminal events into stored failures and a fresh badge count
//! - Keep one bad event from affecting any other
//!
//! # Design Decisions
//! - Handlers never return errors to the event source; failures are logged
//! - A terminal event always consumes its correlation, failure or not
//! - If the mirror cannot be read, the record is built without headers

use std::sync::Arc;

use thiserror::Error;

use crate::badge::CountPublisher;
use crate::capture::events::{LifecycleEvent, TerminalEvent};
use crate::capture::record::{RecordBuilder, TerminalKind};
use crate::capture::store::FailureStore;
use crate::correlation::types::unix_millis;
use crate::correlation::{CorrelationCache, PendingCorrelation};
use crate::observability::metrics;
use crate::storage::StorageError;

/// Errors raised while handling one event.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed event: {0}")]
    Malformed(serde_json::Error),
}

/// What handling one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A header event was applied (or ignored) in the cache.
    Correlated,
    /// A failure was stored; carries the new store size.
    Stored(usize),
    /// The terminal event did not produce a record.
    Dropped(&'static str),
}

/// Receives lifecycle events and drives the capture pipeline.
pub struct EventListener {
    cache: Arc<CorrelationCache>,
    builder: RecordBuilder,
    store: Arc<FailureStore>,
    publisher: CountPublisher,
}

impl EventListener {
    pub fn new(
        cache: Arc<CorrelationCache>,
        builder: RecordBuilder,
        store: Arc<FailureStore>,
        publisher: CountPublisher,
    ) -> Self {
        Self {
            cache,
            builder,
            store,
            publisher,
        }
    }

    /// Handle one event, logging any failure.
    pub async fn handle(&self, event: LifecycleEvent) {
        let kind = event.kind();
        metrics::record_event(kind);
        let request_id = event.request_id().clone();
        if let Err(e) = self.try_handle(event).await {
            tracing::warn!(request_id = %request_id, event = kind, error = %e, "Failed to handle lifecycle event");
        }
    }

    /// Parse and handle one NDJSON line. Blank lines are ignored.
    pub async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match parse_event(line) {
            Ok(event) => self.handle(event).await,
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed lifecycle event"),
        }
    }

    /// Handle one event, surfacing storage errors.
    pub async fn try_handle(&self, event: LifecycleEvent) -> Result<CaptureOutcome, CaptureError> {
        if event.request_id().is_empty() {
            tracing::debug!(event = event.kind(), "Dropping event without request id");
            return Ok(CaptureOutcome::Dropped("missing_request_id"));
        }

        match event {
            LifecycleEvent::SendHeaders(e) => {
                self.cache
                    .record_request_headers(&e.request_id, e.channel, e.request_headers);
                Ok(CaptureOutcome::Correlated)
            }
            LifecycleEvent::HeadersReceived(e) => {
                self.cache
                    .record_response_headers(&e.request_id, e.response_headers);
                Ok(CaptureOutcome::Correlated)
            }
            LifecycleEvent::Completed(e) => self.on_terminal(TerminalKind::Completed, e).await,
            LifecycleEvent::ErrorOccurred(e) => self.on_terminal(TerminalKind::Error, e).await,
        }
    }

    async fn on_terminal(
        &self,
        kind: TerminalKind,
        event: TerminalEvent,
    ) -> Result<CaptureOutcome, CaptureError> {
        let correlation = self.take_correlation(&event).await;

        let record = match self.builder.build(kind, &event, correlation, unix_millis()) {
            Ok(record) => record,
            Err(reason) => {
                tracing::trace!(request_id = %event.request_id, reason = reason.as_str(), "Terminal event not recorded");
                metrics::record_dropped(reason.as_str());
                return Ok(CaptureOutcome::Dropped(reason.as_str()));
            }
        };

        let url = record.url.clone();
        let status = record.status_code;
        let size = self.store.insert(record).await?;
        metrics::record_capture(kind.as_str());
        tracing::info!(
            request_id = %event.request_id,
            url = %url,
            status = ?status,
            stored = size,
            "Captured failed request"
        );

        self.publisher.publish(size).await;
        Ok(CaptureOutcome::Stored(size))
    }

    async fn take_correlation(&self, event: &TerminalEvent) -> Option<PendingCorrelation> {
        match self.cache.consume(&event.request_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    request_id = %event.request_id,
                    error = %e,
                    "Pending headers unavailable; recording without mirror data"
                );
                self.cache.discard(&event.request_id)
            }
        }
    }
}

/// Decode one NDJSON line into an event.
pub fn parse_event(line: &str) -> Result<LifecycleEvent, CaptureError> {
    serde_json::from_str(line).map_err(CaptureError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::LogIndicator;
    use crate::config::CaptureConfig;
    use crate::correlation::CacheSettings;
    use crate::storage::MemoryStore;

    struct Harness {
        listener: EventListener,
        store: Arc<FailureStore>,
        backend: Arc<MemoryStore>,
        indicator: Arc<LogIndicator>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryStore::new());
        let cache = Arc::new(CorrelationCache::new(backend.clone(), CacheSettings::default()));
        let store = Arc::new(FailureStore::new(backend.clone(), "failedRequests", 500));
        let indicator = Arc::new(LogIndicator::new());
        let listener = EventListener::new(
            cache,
            RecordBuilder::new(CaptureConfig::default().internal_schemes),
            store.clone(),
            CountPublisher::new(indicator.clone()),
        );
        Harness {
            listener,
            store,
            backend,
            indicator,
        }
    }

    #[tokio::test]
    async fn test_failure_is_stored_with_headers() {
        let h = harness();
        h.listener
            .handle_line(r#"{"event":"sendHeaders","requestId":"1","requestHeaders":[{"name":"Accept","value":"*/*"}]}"#)
            .await;
        h.listener
            .handle_line(r#"{"event":"headersReceived","requestId":"1","responseHeaders":[{"name":"Server","value":"x"}]}"#)
            .await;
        h.listener
            .handle_line(r#"{"event":"completed","requestId":"1","url":"https://a.test/","method":"POST","statusCode":500}"#)
            .await;

        let list = h.store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].method, "POST");
        assert_eq!(list[0].request_header("accept").unwrap().value, "*/*");
        assert_eq!(list[0].response_header("server").unwrap().value, "x");
        assert_eq!(h.indicator.snapshot().text, "1");
    }

    #[tokio::test]
    async fn test_success_consumes_correlation_without_storing() {
        let h = harness();
        h.listener
            .handle_line(r#"{"event":"headersReceived","requestId":"2","responseHeaders":[{"name":"A","value":"1"}]}"#)
            .await;
        let outcome = h
            .listener
            .try_handle(parse_event(r#"{"event":"completed","requestId":"2","url":"https://a.test/","statusCode":200}"#).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Dropped("not_a_failure"));
        assert!(h.listener.cache.is_empty());
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_outage_is_logged_and_recovers() {
        let h = harness();
        h.listener
            .handle_line(r#"{"event":"sendHeaders","requestId":"3","requestHeaders":[{"name":"A","value":"1"}]}"#)
            .await;

        h.backend.set_offline(true);
        h.listener
            .handle_line(r#"{"event":"errorOccurred","requestId":"3","url":"https://a.test/","error":"net::ERR_FAILED"}"#)
            .await;
        assert!(h.listener.cache.is_empty());

        h.backend.set_offline(false);
        h.listener
            .handle_line(r#"{"event":"errorOccurred","requestId":"4","url":"https://a.test/","error":"net::ERR_FAILED"}"#)
            .await;
        let list = h.store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].status_code, None);
    }

    #[tokio::test]
    async fn test_malformed_and_blank_lines_are_ignored() {
        let h = harness();
        h.listener.handle_line("").await;
        h.listener.handle_line("not json").await;
        h.listener.handle_line(r#"{"event":"completed"}"#).await;
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_request_id_is_dropped() {
        let h = harness();
        let outcome = h
            .listener
            .try_handle(parse_event(r#"{"event":"completed","requestId":"","url":"https://a.test/","statusCode":500}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Dropped("missing_request_id"));
    }
}
