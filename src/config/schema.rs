//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tracker.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the failed-request tracker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    /// Durable storage location and key layout.
    pub storage: StorageConfig,

    /// Correlation and bounded-store tuning.
    pub capture: CaptureConfig,

    /// Indicator badge settings.
    pub badge: BadgeConfig,

    /// Lifecycle event ingest listener.
    pub ingest: IngestConfig,

    /// Command server settings.
    pub commands: CommandsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the namespace. In-memory when absent.
    pub path: Option<PathBuf>,

    /// Key holding the bounded failure list.
    pub failures_key: String,

    /// Key holding the pending-correlation snapshot.
    pub pending_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            failures_key: "failedRequests".to_string(),
            pending_key: "pendingHeaders".to_string(),
        }
    }
}

/// Capture pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Maximum number of failure records kept.
    pub capacity: usize,

    /// Quiet window before pending headers are flushed, in milliseconds.
    pub debounce_ms: u64,

    /// Pending entries untouched for this long are discarded, in seconds.
    pub pending_ttl_secs: u64,

    /// Maximum number of pending correlations held at once.
    pub max_pending: usize,

    /// URL schemes whose failures are never recorded.
    pub internal_schemes: Vec<String>,
}

impl CaptureConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            debounce_ms: 1000,
            pending_ttl_secs: 600,
            max_pending: 2000,
            internal_schemes: ["chrome", "chrome-extension", "edge", "moz-extension", "about"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Badge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BadgeConfig {
    /// Background color as `#rrggbb`.
    pub color: String,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            color: "#d93025".to_string(),
        }
    }
}

/// Ingest listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Bind address (e.g., "127.0.0.1:7401").
    pub bind_address: String,

    /// Maximum concurrent host connections (backpressure).
    pub max_connections: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7401".to_string(),
            max_connections: 64,
        }
    }
}

/// Command server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Bind address (e.g., "127.0.0.1:7402").
    pub bind_address: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7402".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9401".to_string(),
        }
    }
}
