//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Keep the monitoring listener off the service address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{AppConfig, ListenerConfig};
use crate::net::listener;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{section}.address: {reason}")]
    InvalidAddress { section: &'static str, reason: String },

    #[error("{section}.{field} must be greater than zero")]
    ZeroTimeout { section: &'static str, field: &'static str },

    #[error("{section}.request_id_header: '{value}' is not a valid header name")]
    InvalidHeader { section: &'static str, value: String },

    #[error("{section}.tls: file not found: {path}")]
    MissingTlsFile { section: &'static str, path: String },

    #[error("monitoring.address must differ from service.address ({0})")]
    SharedAddress(String),

    #[error("logging.level: {0}")]
    InvalidLogLevel(String),

    #[error("metrics.buckets must not be empty")]
    EmptyBuckets,
}

/// Validate `config`, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener("service", &config.service, &mut errors);
    if let Some(monitoring) = &config.monitoring {
        validate_listener("monitoring", monitoring, &mut errors);

        let service = listener::resolve_address(&config.service.address);
        let monitor = listener::resolve_address(&monitoring.address);
        if let (Ok(service), Ok(monitor)) = (service, monitor) {
            if service.port() != 0 && service == monitor {
                errors.push(ValidationError::SharedAddress(service.to_string()));
            }
        }
    }

    if let Err(e) = EnvFilter::try_new(&config.logging.level) {
        errors.push(ValidationError::InvalidLogLevel(e.to_string()));
    }

    if config.metrics.buckets.is_empty() {
        errors.push(ValidationError::EmptyBuckets);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(section: &'static str, listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if let Err(e) = listener::resolve_address(&listener.address) {
        errors.push(ValidationError::InvalidAddress {
            section,
            reason: e.to_string(),
        });
    }

    for (field, value) in [
        ("read_timeout_secs", listener.read_timeout_secs),
        ("write_timeout_secs", listener.write_timeout_secs),
        ("shutdown_timeout_secs", listener.shutdown_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout { section, field });
        }
    }

    if HeaderName::from_bytes(listener.request_id_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader {
            section,
            value: listener.request_id_header.clone(),
        });
    }

    if let Some(tls) = &listener.tls {
        for path in [&tls.cert_path, &tls.key_path] {
            if !path.exists() {
                errors.push(ValidationError::MissingTlsFile {
                    section,
                    path: path.display().to_string(),
                });
            }
        }
    }
}
