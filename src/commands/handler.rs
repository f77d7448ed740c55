//! Command channel: `{action: ...}` requests against the failure store.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::badge::CountPublisher;
use crate::capture::{FailureRecord, FailureStore};

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetFailedRequests,
    ClearFailedRequests,
}

impl Command {
    /// Read the `action` field of a request.
    pub fn parse(request: &Value) -> Result<Self, String> {
        match request.get("action").and_then(Value::as_str) {
            Some("getFailedRequests") => Ok(Command::GetFailedRequests),
            Some("clearFailedRequests") => Ok(Command::ClearFailedRequests),
            Some(other) => Err(format!("Unknown action: {}", other)),
            None => Err("Missing action".to_string()),
        }
    }
}

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResponse {
    FailedRequests {
        #[serde(rename = "failedRequests")]
        failed_requests: Vec<FailureRecord>,
    },
    Cleared {
        success: bool,
    },
    Error {
        error: String,
    },
}

impl CommandResponse {
    pub fn error(message: impl Into<String>) -> Self {
        CommandResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CommandResponse::Error { .. })
    }
}

/// Result of [`CommandHandler::dispatch`], delivered once storage work completes.
pub struct PendingResponse {
    rx: oneshot::Receiver<CommandResponse>,
}

impl PendingResponse {
    pub async fn recv(self) -> CommandResponse {
        self.rx
            .await
            .unwrap_or_else(|_| CommandResponse::error("Command task ended without a response"))
    }
}

/// Executes commands against the store and keeps the badge in step.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<FailureStore>,
    publisher: CountPublisher,
}

impl CommandHandler {
    pub fn new(store: Arc<FailureStore>, publisher: CountPublisher) -> Self {
        Self { store, publisher }
    }

    /// Start executing `request` and return a handle to its response.
    pub fn dispatch(&self, request: Value) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let handler = self.clone();
        tokio::spawn(async move {
            let response = handler.execute(&request).await;
            // The caller may have gone away.
            let _ = tx.send(response);
        });
        PendingResponse { rx }
    }

    /// Execute `request` inline.
    pub async fn execute(&self, request: &Value) -> CommandResponse {
        let command = match Command::parse(request) {
            Ok(command) => command,
            Err(message) => {
                tracing::debug!(request = %request, "Rejected command");
                return CommandResponse::error(message);
            }
        };

        match command {
            Command::GetFailedRequests => match self.store.list().await {
                Ok(failed_requests) => CommandResponse::FailedRequests { failed_requests },
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list failed requests");
                    CommandResponse::error(e.to_string())
                }
            },
            Command::ClearFailedRequests => match self.store.clear().await {
                Ok(()) => {
                    tracing::info!("Cleared failed requests");
                    self.publisher.publish(0).await;
                    CommandResponse::Cleared { success: true }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to clear failed requests");
                    CommandResponse::error(e.to_string())
                }
            },
        }
    }
}
