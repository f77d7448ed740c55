//! Failure count badge.
//!
//! # Data Flow
//! ```text
//! bounded store size changes (insert / clear / startup)
//!     → publisher.rs (size → "", "1".."99", "99+")
//!     → indicator.rs (host badge; logged + gauge by default)
//! ```

pub mod indicator;
pub mod publisher;

pub use indicator::{BadgeState, Indicator, IndicatorError, LogIndicator};
pub use publisher::{badge_text, CountPublisher};
