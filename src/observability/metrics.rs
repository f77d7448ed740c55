//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tracker_events_total` (counter): lifecycle events by kind
//! - `tracker_failures_captured_total` (counter): stored records by kind
//! - `tracker_failures_dropped_total` (counter): discarded captures by reason
//! - `tracker_store_size` (gauge): records in the bounded store
//! - `tracker_pending_size` (gauge): pending correlations in memory
//! - `tracker_flush_duration_seconds` (histogram): mirror write latency
//! - `tracker_badge_count` (gauge): count shown on the indicator
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event(kind: &'static str) {
    counter!("tracker_events_total", "kind" => kind).increment(1);
}

pub fn record_capture(kind: &'static str) {
    counter!("tracker_failures_captured_total", "kind" => kind).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!("tracker_failures_dropped_total", "reason" => reason).increment(1);
}

pub fn record_store_size(size: usize) {
    gauge!("tracker_store_size").set(size as f64);
}

pub fn record_pending_size(size: usize) {
    gauge!("tracker_pending_size").set(size as f64);
}

pub fn record_flush(started: Instant) {
    histogram!("tracker_flush_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_badge_count(count: usize) {
    gauge!("tracker_badge_count").set(count as f64);
}
