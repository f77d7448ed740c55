//! Host-visible indicator surfaces.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics;

/// Errors raised while updating an indicator.
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("Indicator unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid badge color: {0}")]
    InvalidColor(String),
}

/// A badge the host displays next to the tracker.
#[async_trait]
pub trait Indicator: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<(), IndicatorError>;
    async fn set_background_color(&self, color: &str) -> Result<(), IndicatorError>;
}

/// What the badge currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BadgeState {
    pub text: String,
    pub color: String,
}

/// Indicator that logs updates and exposes the count as a gauge.
///
/// Also keeps the latest state so the command server can report it.
#[derive(Debug, Default)]
pub struct LogIndicator {
    state: Mutex<BadgeState>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BadgeState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Indicator for LogIndicator {
    async fn set_text(&self, text: &str) -> Result<(), IndicatorError> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).text = text.to_string();
        // "99+" reports as the cap; the exact size is in tracker_store_size.
        metrics::record_badge_count(text.trim_end_matches('+').parse().unwrap_or(0));
        tracing::info!(badge = %text, "Badge updated");
        Ok(())
    }

    async fn set_background_color(&self, color: &str) -> Result<(), IndicatorError> {
        if !color.starts_with('#') {
            return Err(IndicatorError::InvalidColor(color.to_string()));
        }
        self.state.lock().unwrap_or_else(|p| p.into_inner()).color = color.to_string();
        tracing::debug!(color = %color, "Badge color set");
        Ok(())
    }
}
