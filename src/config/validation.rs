//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, status codes, addresses)
//! - Check endpoint definitions (unique names, method tokens, path patterns)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::config::schema::{EndpointConfig, ServerConfig};
use crate::routing::table::validate_pattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} {value:?}: not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,

    #[error("endpoint #{index} has an empty name")]
    EmptyEndpointName { index: usize },

    #[error("endpoint {name:?} is defined more than once")]
    DuplicateEndpointName { name: String },

    #[error("endpoint {name:?}: invalid method {method:?}")]
    InvalidMethod { name: String, method: String },

    #[error("endpoint {name:?}: invalid status code {status}")]
    InvalidStatus { name: String, status: u16 },

    #[error("endpoint {name:?}: {reason}")]
    InvalidPath { name: String, reason: String },
}

/// Validate a whole configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let mut seen = HashSet::new();
    for (index, endpoint) in config.endpoints.iter().enumerate() {
        if endpoint.name.trim().is_empty() {
            errors.push(ValidationError::EmptyEndpointName { index });
        } else if !seen.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::DuplicateEndpointName {
                name: endpoint.name.clone(),
            });
        }
        validate_endpoint(endpoint, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_endpoint(endpoint: &EndpointConfig, errors: &mut Vec<ValidationError>) {
    for method in endpoint.methods.iter().flatten() {
        if parse_method(method).is_none() {
            errors.push(ValidationError::InvalidMethod {
                name: endpoint.name.clone(),
                method: method.clone(),
            });
        }
    }

    if StatusCode::from_u16(endpoint.status).is_err() {
        errors.push(ValidationError::InvalidStatus {
            name: endpoint.name.clone(),
            status: endpoint.status,
        });
    }

    for path in endpoint.paths.iter().flatten() {
        if let Err(e) = validate_pattern(path) {
            errors.push(ValidationError::InvalidPath {
                name: endpoint.name.clone(),
                reason: e.to_string(),
            });
        }
    }
}

/// Parse a method token, normalizing to upper case.
pub fn parse_method(method: &str) -> Option<Method> {
    if method.is_empty() {
        return None;
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()
}
