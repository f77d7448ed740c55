//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open storage → Seed cache → Publish count → Spawn flusher → (caller binds listeners)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Listeners stop accepting → Flusher exits → Final flush
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: storage first, then capture, then listeners
//! - The final flush runs after every task holding the cache has stopped

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, ShutdownSignal};
pub use startup::{bootstrap, bootstrap_with, StartupError, Tracker};
