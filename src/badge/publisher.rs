//! Store size → badge text.

use std::sync::Arc;

use crate::badge::indicator::Indicator;
use crate::observability::metrics;

/// Largest count shown literally.
pub const MAX_LITERAL_COUNT: usize = 99;

/// Display text for `count` stored failures.
pub fn badge_text(count: usize) -> String {
    match count {
        0 => String::new(),
        n if n <= MAX_LITERAL_COUNT => n.to_string(),
        _ => format!("{}+", MAX_LITERAL_COUNT),
    }
}

/// Republishes the failure count to an [`Indicator`].
///
/// Indicator failures are logged and never propagated.
#[derive(Clone)]
pub struct CountPublisher {
    indicator: Arc<dyn Indicator>,
}

impl CountPublisher {
    pub fn new(indicator: Arc<dyn Indicator>) -> Self {
        Self { indicator }
    }

    /// Set the badge color. Called once at startup.
    pub async fn init(&self, color: &str) {
        if let Err(e) = self.indicator.set_background_color(color).await {
            tracing::warn!(color = %color, error = %e, "Failed to set badge color");
        }
    }

    /// Show `count` on the badge.
    pub async fn publish(&self, count: usize) {
        metrics::record_store_size(count);
        let text = badge_text(count);
        if let Err(e) = self.indicator.set_text(&text).await {
            tracing::warn!(count, error = %e, "Failed to update badge");
        }
    }
}
