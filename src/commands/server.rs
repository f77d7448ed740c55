//! HTTP surface for the command channel.
//!
//! # Responsibilities
//! - `POST /command`: run one `{action: ...}` command
//! - `GET /status`: liveness plus store, cache and badge summary
//! - `GET /changes`: storage change notifications as server-sent events

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::trace::TraceLayer;

use crate::badge::badge_text;
use crate::capture::FailureStore;
use crate::commands::handler::{CommandHandler, CommandResponse};
use crate::correlation::CorrelationCache;
use crate::storage::KeyValueStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub commands: CommandHandler,
    pub storage: Arc<dyn KeyValueStore>,
    pub store: Arc<FailureStore>,
    pub cache: Arc<CorrelationCache>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub failures: Option<usize>,
    pub capacity: usize,
    pub pending: usize,
    pub unflushed: bool,
    pub badge: Option<String>,
}

pub fn command_router(state: AppState) -> Router {
    Router::new()
        .route("/command", post(post_command))
        .route("/status", get(get_status))
        .route("/changes", get(get_changes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve_commands(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Command server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Command server stopping");
        })
        .await
}

pub async fn post_command(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Json<CommandResponse> {
    Json(state.commands.dispatch(request).recv().await)
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let failures = match state.store.len().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(error = %e, "Status could not read the failure store");
            None
        }
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if failures.is_some() { "operational" } else { "degraded" },
        failures,
        capacity: state.store.capacity(),
        pending: state.cache.len(),
        unflushed: state.cache.has_unflushed(),
        badge: failures.map(badge_text),
    })
}

pub async fn get_changes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let changes = stream::unfold(state.storage.subscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    let event = match Event::default().event("storageChange").json_data(&change) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(key = %change.key, error = %e, "Failed to encode storage change");
                            continue;
                        }
                    };
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(changes).keep_alive(KeepAlive::default())
}
