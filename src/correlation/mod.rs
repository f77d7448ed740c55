//! Request correlation subsystem.
//!
//! # Data Flow
//! ```text
//! header events (send primary / send fallback / receive)
//!     → cache.rs (merge into PendingCorrelation, in memory)
//!     → debounce.rs (re-arm quiet window)
//!     → one mirror write per quiet window
//!
//! terminal event
//!     → cache.rs consume (flush, read mirror, delete, merge)
//!     → capture pipeline builds the FailureRecord
//!
//! process start
//!     → cache.rs seed (mirror → memory)
//! ```

pub mod cache;
pub mod debounce;
pub mod types;

pub use cache::{CacheSettings, CorrelationCache, HeaderChannel};
pub use types::{find_header, HeaderEntry, PendingCorrelation, RequestId};
