//! Failure capture pipeline.
//!
//! # Data Flow
//! ```text
//! lifecycle event (NDJSON line)
//!     → events.rs (decode, tolerate malformed fields)
//!     → listener.rs
//!         header events   → correlation cache (debounced mirror)
//!         terminal events → consume correlation
//!                         → record.rs (qualify, validate URL, build)
//!                         → store.rs (prepend, cap at capacity)
//!                         → count publisher
//! ```

pub mod events;
pub mod listener;
pub mod record;
pub mod store;

pub use events::{HeadersReceivedEvent, LifecycleEvent, SendHeadersEvent, TerminalEvent};
pub use listener::{parse_event, CaptureError, CaptureOutcome, EventListener};
pub use record::{DropReason, FailureRecord, RecordBuilder, TerminalKind};
pub use store::FailureStore;
