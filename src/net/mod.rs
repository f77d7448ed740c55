//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Event source TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → one NDJSON line per lifecycle event
//!     → capture::EventListener, in arrival order
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Lines from one connection are handled sequentially; connections run concurrently

pub mod listener;

pub use listener::{ingest_stream, IngestListener, ListenerError};
