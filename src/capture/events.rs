//! Lifecycle events delivered by the host network layer.
//!
//! One JSON object per event, tagged by `"event"`. Fields the host gets wrong
//! degrade instead of failing the whole event: a non-string `url` reads as
//! absent, a malformed header list reads as empty.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::correlation::types::{lenient_headers, HeaderEntry};
use crate::correlation::{HeaderChannel, RequestId};

/// One phase notification for one request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// Outgoing headers, from either host channel.
    SendHeaders(SendHeadersEvent),
    /// Incoming headers.
    HeadersReceived(HeadersReceivedEvent),
    /// The request finished with a server response.
    Completed(TerminalEvent),
    /// The request could not complete.
    ErrorOccurred(TerminalEvent),
}

impl LifecycleEvent {
    pub fn request_id(&self) -> &RequestId {
        match self {
            LifecycleEvent::SendHeaders(e) => &e.request_id,
            LifecycleEvent::HeadersReceived(e) => &e.request_id,
            LifecycleEvent::Completed(e) | LifecycleEvent::ErrorOccurred(e) => &e.request_id,
        }
    }

    /// Metric label for this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::SendHeaders(e) => match e.channel {
                HeaderChannel::Primary => "send_headers",
                HeaderChannel::Fallback => "send_headers_fallback",
            },
            LifecycleEvent::HeadersReceived(_) => "headers_received",
            LifecycleEvent::Completed(_) => "completed",
            LifecycleEvent::ErrorOccurred(_) => "error_occurred",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendHeadersEvent {
    pub request_id: RequestId,
    #[serde(default)]
    pub channel: HeaderChannel,
    #[serde(default, deserialize_with = "lenient_headers")]
    pub request_headers: Option<Vec<HeaderEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadersReceivedEvent {
    pub request_id: RequestId,
    #[serde(default, deserialize_with = "lenient_headers")]
    pub response_headers: Option<Vec<HeaderEntry>>,
}

/// Payload of a completion or error event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalEvent {
    pub request_id: RequestId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(default, rename = "type", alias = "resourceType", deserialize_with = "lenient_string")]
    pub resource_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub initiator: Option<String>,
    #[serde(default, deserialize_with = "lenient_tab_id")]
    pub tab_id: Option<i64>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok()))
}

fn lenient_tab_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(Value::as_i64))
}
