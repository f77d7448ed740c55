//! Query/command interface.
//!
//! # Data Flow
//! ```text
//! POST /command {action}
//!     → server.rs (axum router, trace layer)
//!     → handler.rs (dispatch; result delivered once storage work completes)
//!     → failure store (list / clear) → count publisher on clear
//! ```

pub mod handler;
pub mod server;

pub use handler::{Command, CommandHandler, CommandResponse, PendingResponse};
pub use server::{command_router, serve_commands, AppState, SystemStatus};
