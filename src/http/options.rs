//! Server configuration and options.
//!
//! A [`RuntimeConfig`] starts from defaults, is mutated by [`ServerOption`]s
//! in order (the first failing option aborts), and is validated once before
//! anything is bound.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::http::defaults::{self, IpLookup};
use crate::http::route::{Endpoint, RouteInfo};
use crate::http::router::{DefaultRouter, Router};
use crate::http::server::ServerError;
use crate::net::listener;
use crate::net::tls::TlsMaterial;
use crate::observability::Metrics;

/// Builds the index endpoint from the final list of bound routes.
pub type IndexHandler = Arc<dyn Fn(Arc<[RouteInfo]>) -> Endpoint + Send + Sync>;

/// Middleware applied to the whole router, inside the request context layer.
pub type RouterLayer = Arc<dyn Fn(axum::Router) -> axum::Router + Send + Sync>;

/// Endpoints backing the default routes, keyed by route. The index is
/// built separately by an [`IndexHandler`].
pub type DefaultHandlers = HashMap<DefaultRoute, Endpoint>;

/// A mutation applied to a [`RuntimeConfig`].
pub type ServerOption = Box<dyn FnOnce(&mut RuntimeConfig) -> Result<(), ServerError> + Send>;

/// Built-in diagnostic routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultRoute {
    Index,
    Ip,
    Metrics,
    Ping,
    Pprof,
    Status,
}

impl DefaultRoute {
    pub const ALL: [DefaultRoute; 6] = [
        DefaultRoute::Index,
        DefaultRoute::Ip,
        DefaultRoute::Metrics,
        DefaultRoute::Ping,
        DefaultRoute::Pprof,
        DefaultRoute::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultRoute::Index => "index",
            DefaultRoute::Ip => "ip",
            DefaultRoute::Metrics => "metrics",
            DefaultRoute::Ping => "ping",
            DefaultRoute::Pprof => "pprof",
            DefaultRoute::Status => "status",
        }
    }
}

impl fmt::Display for DefaultRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefaultRoute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DefaultRoute::ALL
            .into_iter()
            .find(|route| route.as_str() == s)
            .ok_or_else(|| format!("unknown default route '{s}'"))
    }
}

/// Configuration of one HTTP server.
pub struct RuntimeConfig {
    /// `host:port`; empty host binds every interface, port 0 is ephemeral.
    pub address: String,
    /// Deadline for reading request headers.
    pub read_timeout: Duration,
    /// Deadline for a handler to produce its response.
    pub write_timeout: Duration,
    /// Grace period for in-flight requests once the context is cancelled.
    pub shutdown_timeout: Duration,
    pub tls: Option<TlsMaterial>,
    pub default_routes: BTreeSet<DefaultRoute>,
    /// Endpoints backing every default route except the index.
    pub handlers: DefaultHandlers,
    pub index_handler: IndexHandler,
    pub router: Box<dyn Router>,
    pub request_id_header: String,
    pub middleware: Vec<RouterLayer>,
    /// Log each request served by a default route.
    pub log_default_routes: bool,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("address", &self.address)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("tls", &self.tls.is_some())
            .field("default_routes", &self.default_routes)
            .field("request_id_header", &self.request_id_header)
            .field("middleware", &self.middleware.len())
            .field("log_default_routes", &self.log_default_routes)
            .finish_non_exhaustive()
    }
}

impl RuntimeConfig {
    /// Defaults: `:8080`, 10s read, 30s write, 10s shutdown, plain HTTP,
    /// `ping` and `status` enabled.
    pub fn new(metrics: &Metrics) -> Self {
        let handlers = HashMap::from([
            (DefaultRoute::Ip, defaults::ip(defaults::public_ip_lookup(defaults::PUBLIC_IP_URL))),
            (DefaultRoute::Metrics, defaults::metrics(metrics.clone())),
            (DefaultRoute::Ping, defaults::ping()),
            (DefaultRoute::Pprof, defaults::pprof()),
            (DefaultRoute::Status, defaults::status()),
        ]);

        Self {
            address: ":8080".to_string(),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            tls: None,
            default_routes: BTreeSet::from([DefaultRoute::Ping, DefaultRoute::Status]),
            handlers,
            index_handler: Arc::new(defaults::index),
            router: Box::new(DefaultRouter::new()),
            request_id_header: crate::http::request::X_REQUEST_ID.to_string(),
            middleware: Vec::new(),
            log_default_routes: false,
        }
    }

    /// Check every invariant and return the resolved bind address and
    /// request-id header.
    pub fn validate(&self) -> Result<(SocketAddr, HeaderName), ServerError> {
        let address = listener::resolve_address(&self.address)?;

        if self.shutdown_timeout.is_zero() {
            return Err(ServerError::InvalidConfig("shutdown timeout must be greater than zero".into()));
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(ServerError::InvalidConfig("read and write timeouts must be greater than zero".into()));
        }

        let header = HeaderName::from_str(&self.request_id_header).map_err(|_| {
            ServerError::InvalidConfig(format!("invalid request id header '{}'", self.request_id_header))
        })?;

        if let Some(missing) = self
            .default_routes
            .iter()
            .find(|route| **route != DefaultRoute::Index && !self.handlers.contains_key(route))
        {
            return Err(ServerError::InvalidConfig(format!("no handler for enabled default route '{missing}'")));
        }

        Ok((address, header))
    }
}

pub fn with_address(address: impl Into<String>) -> ServerOption {
    let address = address.into();
    Box::new(move |config| {
        config.address = address;
        Ok(())
    })
}

pub fn with_read_timeout(timeout: Duration) -> ServerOption {
    Box::new(move |config| {
        config.read_timeout = timeout;
        Ok(())
    })
}

pub fn with_write_timeout(timeout: Duration) -> ServerOption {
    Box::new(move |config| {
        config.write_timeout = timeout;
        Ok(())
    })
}

pub fn with_shutdown_timeout(timeout: Duration) -> ServerOption {
    Box::new(move |config| {
        config.shutdown_timeout = timeout;
        Ok(())
    })
}

/// Serve TLS with a PEM certificate chain and private key. Fails on
/// malformed or empty material.
pub fn with_tls(cert_pem: impl AsRef<[u8]>, key_pem: impl AsRef<[u8]>) -> ServerOption {
    let parsed = TlsMaterial::from_pem(cert_pem.as_ref(), key_pem.as_ref());
    Box::new(move |config| {
        config.tls = Some(parsed?);
        Ok(())
    })
}

pub fn with_tls_material(material: TlsMaterial) -> ServerOption {
    Box::new(move |config| {
        config.tls = Some(material);
        Ok(())
    })
}

pub fn with_request_id_header(header: impl Into<String>) -> ServerOption {
    let header = header.into();
    Box::new(move |config| {
        config.request_id_header = header;
        Ok(())
    })
}

/// Enable exactly `routes`; every other default route is left unregistered.
pub fn with_default_routes(routes: impl IntoIterator<Item = DefaultRoute>) -> ServerOption {
    let routes: BTreeSet<_> = routes.into_iter().collect();
    Box::new(move |config| {
        config.default_routes = routes;
        Ok(())
    })
}

/// Replace the endpoint backing a default route.
pub fn with_handler(route: DefaultRoute, endpoint: Endpoint) -> ServerOption {
    Box::new(move |config| {
        match route {
            DefaultRoute::Index => config.index_handler = Arc::new(move |_| endpoint.clone()),
            _ => {
                config.handlers.insert(route, endpoint);
            }
        }
        Ok(())
    })
}

/// Remove the endpoint backing a default route. Enabling the route
/// afterwards fails validation.
pub fn without_handler(route: DefaultRoute) -> ServerOption {
    Box::new(move |config| {
        config.handlers.remove(&route);
        Ok(())
    })
}

pub fn with_index_handler<F>(handler: F) -> ServerOption
where
    F: Fn(Arc<[RouteInfo]>) -> Endpoint + Send + Sync + 'static,
{
    Box::new(move |config| {
        config.index_handler = Arc::new(handler);
        Ok(())
    })
}

/// Back the `ip` route with a different public IP lookup.
pub fn with_ip_lookup(lookup: IpLookup) -> ServerOption {
    Box::new(move |config| {
        config.handlers.insert(DefaultRoute::Ip, defaults::ip(lookup));
        Ok(())
    })
}

/// Add router-wide middleware. Layers apply in the order added.
pub fn with_middleware<F>(layer: F) -> ServerOption
where
    F: Fn(axum::Router) -> axum::Router + Send + Sync + 'static,
{
    Box::new(move |config| {
        config.middleware.push(Arc::new(layer));
        Ok(())
    })
}

pub fn with_router(router: impl Router + 'static) -> ServerOption {
    Box::new(move |config| {
        config.router = Box::new(router);
        Ok(())
    })
}

pub fn with_default_route_logging(enabled: bool) -> ServerOption {
    Box::new(move |config| {
        config.log_default_routes = enabled;
        Ok(())
    })
}

/// Apply `options` in order, stopping at the first failure.
pub(crate) fn apply(
    mut config: RuntimeConfig,
    options: impl IntoIterator<Item = ServerOption>,
) -> Result<RuntimeConfig, ServerError> {
    for option in options {
        option(&mut config)?;
    }
    Ok(config)
}
