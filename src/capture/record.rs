//! Failure record construction.
//!
//! # Responsibilities
//! - Decide whether a terminal event is a failure
//! - Validate the URL (present, not an internal scheme)
//! - Assemble the immutable record from the event and its correlation
//!
//! # Design Decisions
//! - Status failures start at exactly 400
//! - Error events always carry a null status, even if the host sent one
//! - Record ids combine request id and build time, so reused ids stay distinct

use serde::{Deserialize, Serialize};
use url::Url;

use crate::capture::events::TerminalEvent;
use crate::correlation::types::{find_header, HeaderEntry, PendingCorrelation};

/// Lowest status code recorded as a failure.
pub const MIN_FAILURE_STATUS: u16 = 400;

const DEFAULT_METHOD: &str = "GET";
const DEFAULT_ERROR: &str = "Unknown error";

/// Which terminal event ended the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Completed,
    Error,
}

impl TerminalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalKind::Completed => "status",
            TerminalKind::Error => "network",
        }
    }
}

/// One captured failure. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    /// `None` when the request never received a response.
    pub status_code: Option<u16>,
    pub error_description: String,
    /// Build time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Empty when nothing was correlated.
    #[serde(default)]
    pub request_headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub response_headers: Vec<HeaderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}

impl FailureRecord {
    pub fn request_header(&self, name: &str) -> Option<&HeaderEntry> {
        find_header(&self.request_headers, name)
    }

    pub fn response_header(&self, name: &str) -> Option<&HeaderEntry> {
        find_header(&self.response_headers, name)
    }
}

/// Why a terminal event produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Completed below the failure threshold.
    NotAFailure,
    /// No usable URL on the event.
    MissingUrl,
    /// The URL uses an internal scheme.
    InternalScheme(String),
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NotAFailure => "not_a_failure",
            DropReason::MissingUrl => "missing_url",
            DropReason::InternalScheme(_) => "internal_scheme",
        }
    }
}

/// Builds [`FailureRecord`]s from terminal events.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    internal_schemes: Vec<String>,
}

impl RecordBuilder {
    pub fn new<I, S>(internal_schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            internal_schemes: internal_schemes
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether `kind` with this event qualifies as a failure at all.
    pub fn is_failure(kind: TerminalKind, event: &TerminalEvent) -> bool {
        match kind {
            TerminalKind::Completed => event
                .status_code
                .is_some_and(|code| code >= MIN_FAILURE_STATUS),
            TerminalKind::Error => true,
        }
    }

    /// Build the record for `event`, merging headers from `correlation`.
    pub fn build(
        &self,
        kind: TerminalKind,
        event: &TerminalEvent,
        correlation: Option<PendingCorrelation>,
        timestamp: u64,
    ) -> Result<FailureRecord, DropReason> {
        if !Self::is_failure(kind, event) {
            return Err(DropReason::NotAFailure);
        }
        let url = event
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(DropReason::MissingUrl)?;
        if let Some(scheme) = self.internal_scheme(url) {
            return Err(DropReason::InternalScheme(scheme));
        }

        let (status_code, error_description) = match kind {
            TerminalKind::Completed => {
                let code = event.status_code.unwrap_or_default();
                (Some(code), format!("HTTP {}", code))
            }
            TerminalKind::Error => (
                None,
                event
                    .error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR.to_string()),
            ),
        };
        let (request_headers, response_headers) = correlation
            .map(|c| {
                (
                    c.request_headers.unwrap_or_default(),
                    c.response_headers.unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        Ok(FailureRecord {
            id: format!("{}-{}", event.request_id, timestamp),
            url: url.to_string(),
            method: event
                .method
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            status_code,
            error_description,
            timestamp,
            resource_type: event.resource_type.clone(),
            request_headers,
            response_headers,
            initiator: event.initiator.clone(),
            tab_id: event.tab_id,
        })
    }

    /// The internal scheme `url` uses, if any.
    fn internal_scheme(&self, url: &str) -> Option<String> {
        let scheme = match Url::parse(url) {
            Ok(parsed) => parsed.scheme().to_string(),
            // Relative or otherwise unparsable; fall back to the text before ':'.
            Err(_) => url.split_once(':')?.0.trim().to_ascii_lowercase(),
        };
        self.internal_schemes
            .iter()
            .any(|s| *s == scheme)
            .then_some(scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;

    fn builder() -> RecordBuilder {
        RecordBuilder::new(CaptureConfig::default().internal_schemes)
    }

    fn event(url: &str, status: Option<u16>) -> TerminalEvent {
        TerminalEvent {
            request_id: "100".into(),
            url: Some(url.to_string()),
            status_code: status,
            ..TerminalEvent::default()
        }
    }

    #[test]
    fn test_status_boundary() {
        let b = builder();
        assert_eq!(
            b.build(TerminalKind::Completed, &event("https://a.test/", Some(399)), None, 1),
            Err(DropReason::NotAFailure)
        );
        let record = b
            .build(TerminalKind::Completed, &event("https://a.test/", Some(400)), None, 1)
            .unwrap();
        assert_eq!(record.status_code, Some(400));
        assert_eq!(record.error_description, "HTTP 400");
        assert_eq!(record.method, "GET");
        assert_eq!(record.id, "100-1");
    }

    #[test]
    fn test_completion_without_status_is_not_a_failure() {
        assert_eq!(
            builder().build(TerminalKind::Completed, &event("https://a.test/", None), None, 1),
            Err(DropReason::NotAFailure)
        );
    }

    #[test]
    fn test_error_event_has_null_status() {
        let mut e = event("https://a.test/", Some(502));
        e.error = Some("net::ERR_CONNECTION_RESET".to_string());
        e.method = Some("PUT".to_string());

        let record = builder().build(TerminalKind::Error, &e, None, 5).unwrap();
        assert_eq!(record.status_code, None);
        assert_eq!(record.error_description, "net::ERR_CONNECTION_RESET");
        assert_eq!(record.method, "PUT");

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["statusCode"].is_null());
        assert!(json.as_object().unwrap().contains_key("statusCode"));
        assert_eq!(json["requestHeaders"], serde_json::json!([]));
        assert_eq!(json["responseHeaders"], serde_json::json!([]));
    }

    #[test]
    fn test_error_without_description_uses_default() {
        let record = builder()
            .build(TerminalKind::Error, &event("https://a.test/", None), None, 5)
            .unwrap();
        assert_eq!(record.error_description, "Unknown error");
    }

    #[test]
    fn test_internal_and_missing_urls_are_dropped() {
        let b = builder();
        for url in [
            "chrome://settings",
            "chrome-extension://abcdef/popup.html",
            "about:blank",
            "edge://flags",
            "moz-extension://x/y",
        ] {
            assert!(
                matches!(
                    b.build(TerminalKind::Error, &event(url, None), None, 1),
                    Err(DropReason::InternalScheme(_))
                ),
                "{} should be dropped",
                url
            );
        }

        let mut no_url = event("", None);
        assert_eq!(
            b.build(TerminalKind::Error, &no_url, None, 1),
            Err(DropReason::MissingUrl)
        );
        no_url.url = None;
        assert_eq!(
            b.build(TerminalKind::Error, &no_url, None, 1),
            Err(DropReason::MissingUrl)
        );
    }

    #[test]
    fn test_headers_come_from_correlation() {
        let correlation = PendingCorrelation {
            request_id: "100".into(),
            request_headers: Some(vec![HeaderEntry::new("X-A", "1")]),
            response_headers: Some(vec![HeaderEntry::new("Content-Type", "text/plain")]),
            updated_at: 0,
        };
        let record = builder()
            .build(
                TerminalKind::Completed,
                &event("https://a.test/missing", Some(404)),
                Some(correlation),
                9,
            )
            .unwrap();

        assert_eq!(record.request_header("x-a").unwrap().value, "1");
        assert_eq!(record.response_header("CONTENT-TYPE").unwrap().value, "text/plain");
    }
}
