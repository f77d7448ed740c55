//! Correlation data model.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Host-assigned identifier of one in-flight request.
///
/// Unique only while the request is alive; the host may reuse it later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Hosts deliver ids as strings or bare integers.
impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(id) => Ok(Self(id)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(D::Error::custom(format!("invalid request id: {}", other))),
        }
    }
}

/// One HTTP header. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Build an entry from loosely-typed JSON; entries without a string name are skipped.
    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let value = value.get("value").and_then(Value::as_str).unwrap_or_default();
        Some(Self::new(name, value))
    }
}

/// First header named `name`, ignoring ASCII case.
pub fn find_header<'a>(headers: &'a [HeaderEntry], name: &str) -> Option<&'a HeaderEntry> {
    headers.iter().find(|h| h.is_named(name))
}

/// Deserialize a header array, degrading malformed input to an empty list.
///
/// Absent or `null` stays `None` so it never overlays an existing value.
pub fn lenient_headers<'de, D>(deserializer: D) -> Result<Option<Vec<HeaderEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.iter().filter_map(HeaderEntry::from_value).collect()),
        Some(other) => {
            tracing::debug!(value = %other, "Malformed header list, treating as empty");
            Some(Vec::new())
        }
    })
}

/// Partially assembled header data for one request.
///
/// Merge-on-write: a later patch overlays only the fields it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCorrelation {
    #[serde(default)]
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Vec<HeaderEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<HeaderEntry>>,
    /// Last mutation time, used to expire abandoned entries.
    #[serde(default)]
    pub updated_at: u64,
}

impl PendingCorrelation {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            ..Self::default()
        }
    }

    /// True when no non-empty outgoing headers have been captured yet.
    pub fn request_headers_empty(&self) -> bool {
        self.request_headers.as_ref().map_or(true, Vec::is_empty)
    }

    /// Overlay the fields `newer` carries onto `self`.
    pub fn merge(mut self, newer: PendingCorrelation) -> Self {
        if newer.request_headers.is_some() {
            self.request_headers = newer.request_headers;
        }
        if newer.response_headers.is_some() {
            self.response_headers = newer.response_headers;
        }
        self.updated_at = self.updated_at.max(newer.updated_at);
        if self.request_id.is_empty() {
            self.request_id = newer.request_id;
        }
        self
    }
}
