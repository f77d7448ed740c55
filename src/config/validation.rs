//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, debounce > 0)
//! - Check addresses and colors parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TrackerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::TrackerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &TrackerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.capture.capacity == 0 {
        errors.push(ValidationError::new("capture.capacity", "must be greater than 0"));
    }
    if config.capture.debounce_ms == 0 {
        errors.push(ValidationError::new("capture.debounce_ms", "must be greater than 0"));
    }
    if config.capture.max_pending == 0 {
        errors.push(ValidationError::new("capture.max_pending", "must be greater than 0"));
    }
    for scheme in &config.capture.internal_schemes {
        let valid = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+-.".contains(c));
        if !valid {
            errors.push(ValidationError::new(
                "capture.internal_schemes",
                format!("'{}' is not a lowercase URL scheme", scheme),
            ));
        }
    }

    if config.storage.failures_key.is_empty() {
        errors.push(ValidationError::new("storage.failures_key", "must not be empty"));
    }
    if config.storage.pending_key.is_empty() {
        errors.push(ValidationError::new("storage.pending_key", "must not be empty"));
    }
    if config.storage.failures_key == config.storage.pending_key {
        errors.push(ValidationError::new(
            "storage.pending_key",
            "must differ from storage.failures_key",
        ));
    }

    if !is_hex_color(&config.badge.color) {
        errors.push(ValidationError::new(
            "badge.color",
            format!("'{}' is not a #rrggbb color", config.badge.color),
        ));
    }

    check_address(&mut errors, "ingest.bind_address", &config.ingest.bind_address);
    check_address(&mut errors, "commands.bind_address", &config.commands.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.ingest.max_connections == 0 {
        errors.push(ValidationError::new("ingest.max_connections", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TrackerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = TrackerConfig::default();
        config.capture.capacity = 0;
        config.capture.debounce_ms = 0;
        config.badge.color = "red".to_string();
        config.ingest.bind_address = "not-an-address".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "capture.capacity",
                "capture.debounce_ms",
                "badge.color",
                "ingest.bind_address"
            ]
        );
    }

    #[test]
    fn test_rejects_uppercase_scheme_and_shared_keys() {
        let mut config = TrackerConfig::default();
        config.capture.internal_schemes.push("Chrome".to_string());
        config.storage.pending_key = config.storage.failures_key.clone();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("Chrome"));
    }

    #[test]
    fn test_rejects_zero_ingest_connections() {
        let mut config = TrackerConfig::default();
        config.ingest.max_connections = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "ingest.max_connections: must be greater than 0");
    }
}
