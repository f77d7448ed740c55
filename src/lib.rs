//! Failed-request tracker library.
//!
//! Watches request lifecycle events, correlates headers across phases and
//! keeps a bounded, persistent history of failed requests.

pub mod badge;
pub mod capture;
pub mod commands;
pub mod config;
pub mod correlation;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod storage;

pub use config::TrackerConfig;
pub use lifecycle::{Shutdown, Tracker};
