//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so a minimal file is enough.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::options::{self, DefaultRoute, ServerOption};
use crate::net::tls::{TlsError, TlsMaterial};
use crate::observability::{LoggingConfig, MetricsConfig};

/// Root configuration of a service process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Public listener serving the application routes.
    pub service: ListenerConfig,

    /// Optional second listener for diagnostics, kept off the public port.
    pub monitoring: Option<ListenerConfig>,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,
}

/// One HTTP listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g. "0.0.0.0:8080", ":8080").
    pub address: String,

    /// Deadline for reading request headers.
    pub read_timeout_secs: u64,

    /// Deadline for producing a response.
    pub write_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout_secs: u64,

    /// Header carrying the request ID in both directions.
    pub request_id_header: String,

    /// Built-in routes to expose on this listener.
    pub default_routes: Vec<DefaultRoute>,

    /// Log requests served by built-in routes.
    pub log_default_routes: bool,

    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: ":8080".to_string(),
            read_timeout_secs: 10,
            write_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            request_id_header: crate::http::X_REQUEST_ID.to_string(),
            default_routes: vec![DefaultRoute::Ping, DefaultRoute::Status],
            log_default_routes: false,
            tls: None,
        }
    }
}

impl ListenerConfig {
    /// Server options equivalent to this section. Reads the TLS files.
    pub fn to_options(&self) -> Result<Vec<ServerOption>, TlsError> {
        let mut opts = vec![
            options::with_address(self.address.clone()),
            options::with_read_timeout(Duration::from_secs(self.read_timeout_secs)),
            options::with_write_timeout(Duration::from_secs(self.write_timeout_secs)),
            options::with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs)),
            options::with_request_id_header(self.request_id_header.clone()),
            options::with_default_routes(self.default_routes.iter().copied()),
            options::with_default_route_logging(self.log_default_routes),
        ];
        if let Some(tls) = &self.tls {
            let material = TlsMaterial::from_pem_files(&tls.cert_path, &tls.key_path)?;
            opts.push(options::with_tls_material(material));
        }
        Ok(opts)
    }
}

/// TLS configuration for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.service.address, ":8080");
        assert!(config.monitoring.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_routes_parse_by_name() {
        let config: AppConfig = toml::from_str(
            r#"
            [monitoring]
            address = "127.0.0.1:9090"
            default_routes = ["index", "metrics", "pprof"]
            "#,
        )
        .unwrap();
        let monitoring = config.monitoring.unwrap();
        assert_eq!(
            monitoring.default_routes,
            [DefaultRoute::Index, DefaultRoute::Metrics, DefaultRoute::Pprof]
        );
        assert_eq!(monitoring.shutdown_timeout_secs, 10);
    }

    #[test]
    fn test_unknown_route_rejected() {
        let result: Result<AppConfig, _> = toml::from_str(
            r#"
            [service]
            default_routes = ["health"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_tls_files_fail_option_conversion() {
        let listener = ListenerConfig {
            tls: Some(TlsConfig {
                cert_path: "/nonexistent/cert.pem".into(),
                key_path: "/nonexistent/key.pem".into(),
            }),
            ..ListenerConfig::default()
        };
        assert!(matches!(listener.to_options(), Err(TlsError::Pem(_))));
    }
}
