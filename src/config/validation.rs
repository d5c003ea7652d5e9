//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Report malformed CIDR entries and host patterns that would silently never match
//! - Validate value ranges and header names/values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: KitConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::KitConfig;
use crate::cookies::Cookie;

/// A single semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &KitConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }

    for (field, set) in [
        ("trust.trusted_ips", &config.trust.trusted_ips),
        ("trust.untrusted_ips", &config.trust.untrusted_ips),
    ] {
        for entry in set.invalid_entries() {
            errors.push(ValidationError::new(
                field,
                format!("{:?} is neither an IP address nor a CIDR range", entry.as_str()),
            ));
        }
    }

    for pattern in config.trust.trusted_hosts.iter().filter(|p| !p.is_valid()) {
        errors.push(ValidationError::new(
            "trust.trusted_hosts",
            format!("{pattern} is not a valid regular expression"),
        ));
    }

    if let Err(e) = Cookie::new(config.cookies.session_name.clone(), "") {
        errors.push(ValidationError::new("cookies.session_name", e.to_string()));
    }

    if config.uploads.prefix.is_empty() || config.uploads.prefix.contains(['/', '\\']) {
        errors.push(ValidationError::new(
            "uploads.prefix",
            "must be non-empty and contain no path separators",
        ));
    }

    for (name, value) in &config.files.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new("files.headers", format!("invalid header name {name:?}")));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new("files.headers", format!("invalid value for header {name:?}")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
