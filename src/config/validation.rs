//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint paths, methods and backend hosts
//! - Detect duplicate endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
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

/// Check the configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    for (i, endpoint) in config.endpoints.iter().enumerate() {
        let field = format!("endpoints[{}]", i);

        if !endpoint.endpoint.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}.endpoint", field),
                format!("{:?} must start with '/'", endpoint.endpoint),
            ));
        }
        if Method::from_bytes(endpoint.method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("{}.method", field),
                format!("{:?} is not a valid HTTP method", endpoint.method),
            ));
        }
        if !seen.insert((endpoint.method.to_uppercase(), endpoint.endpoint.as_str())) {
            errors.push(ValidationError::new(
                format!("{}.endpoint", field),
                format!("duplicate endpoint {} {}", endpoint.method, endpoint.endpoint),
            ));
        }
        if endpoint.backends.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.backends", field),
                "at least one backend is required",
            ));
        }

        for (j, backend) in endpoint.backends.iter().enumerate() {
            let field = format!("{}.backends[{}]", field, j);
            match Url::parse(&backend.host) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(ValidationError::new(
                    format!("{}.host", field),
                    format!("unsupported scheme {:?}", url.scheme()),
                )),
                Err(e) => errors.push(ValidationError::new(
                    format!("{}.host", field),
                    format!("{:?} is not a valid url: {}", backend.host, e),
                )),
            }
            if !backend.url_pattern.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("{}.url_pattern", field),
                    format!("{:?} must start with '/'", backend.url_pattern),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
