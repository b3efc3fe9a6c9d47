//! Built-in diagnostic routes.
//!
//! # Responsibilities
//! - Provide the stock endpoints: ping, status, metrics, ip, pprof and index
//! - Turn the enabled set of a [`RuntimeConfig`] into routes
//!
//! # Design Decisions
//! - A disabled route is never registered, so it answers the generic 404
//! - The index is not built here; it needs the final route list and is
//!   registered last by the server
//! - Default routes are quiet unless default route logging is enabled

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::http::options::{DefaultRoute, RuntimeConfig};
use crate::http::pprof;
use crate::http::route::{Endpoint, Route, RouteInfo};
use crate::http::Method;
use crate::observability::{BoxError, Metrics};

/// Echo service queried by the default public IP lookup.
pub const PUBLIC_IP_URL: &str = "https://api.ipify.org";

/// Content type of the Prometheus text exposition.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub const INDEX_PATH: &str = "/";

/// Resolves the public IP address of the process.
pub type IpLookup = Arc<dyn Fn() -> BoxFuture<'static, Result<IpAddr, BoxError>> + Send + Sync>;

/// Lookup asking `url` for our address as plain text.
pub fn public_ip_lookup(url: impl Into<String>) -> IpLookup {
    let url: Arc<str> = url.into().into();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default();

    Arc::new(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let body = client
                .get(&*url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            Ok::<IpAddr, BoxError>(body.trim().parse()?)
        }
        .boxed()
    })
}

/// Liveness: always `200 OK`.
pub fn ping() -> Endpoint {
    Endpoint::handler(|| async { "OK" })
}

/// Readiness: `200 OK`. Replace with [`with_handler`](crate::http::options::with_handler)
/// to report real dependency health.
pub fn status() -> Endpoint {
    Endpoint::handler(|| async { "OK" })
}

pub fn metrics(metrics: Metrics) -> Endpoint {
    Endpoint::handler(move || {
        let metrics = metrics.clone();
        async move { ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], metrics.render()) }
    })
}

/// Plain-text public IP, `424 Failed Dependency` when the lookup fails.
pub fn ip(lookup: IpLookup) -> Endpoint {
    Endpoint::handler(move || {
        let lookup = lookup.clone();
        async move {
            match lookup().await {
                Ok(ip) => ip.to_string().into_response(),
                Err(e) => {
                    tracing::warn!(error = %e, "Public IP lookup failed");
                    (StatusCode::FAILED_DEPENDENCY, "public ip lookup failed").into_response()
                }
            }
        }
    })
}

/// Serves both `/pprof/` and `/pprof/{profile}`. An override given with
/// [`with_handler`](crate::http::options::with_handler) is bound to both
/// paths as well.
pub fn pprof() -> Endpoint {
    Endpoint::handler(pprof::serve)
}

/// JSON list of every bound route.
pub fn index(routes: Arc<[RouteInfo]>) -> Endpoint {
    Endpoint::handler(move || {
        let routes = routes.clone();
        async move { Json(routes.to_vec()) }
    })
}

/// Routes for every enabled default route except the index, in
/// [`DefaultRoute`] order.
pub(crate) fn build(config: &RuntimeConfig) -> Vec<Route> {
    let mut routes = Vec::new();

    for route in &config.default_routes {
        let Some(endpoint) = config.handlers.get(route).cloned() else {
            continue;
        };
        match route {
            DefaultRoute::Index => {}
            DefaultRoute::Ip => routes.push(
                Route::new(Method::GET, "/ip", endpoint).with_description("Public IP address of the process"),
            ),
            DefaultRoute::Metrics => routes.push(
                Route::new(Method::GET, "/metrics", endpoint).with_description("Prometheus metrics"),
            ),
            DefaultRoute::Ping => routes.push(
                Route::new(Method::GET, "/ping", endpoint).with_description("Liveness check"),
            ),
            DefaultRoute::Pprof => {
                routes.push(
                    Route::new(Method::GET, "/pprof/", endpoint.clone())
                        .with_description("Available runtime profiles"),
                );
                routes.push(
                    Route::new(Method::GET, "/pprof/{profile}", endpoint)
                        .with_description("Runtime profile by name"),
                );
            }
            DefaultRoute::Status => routes.push(
                Route::new(Method::GET, "/status", endpoint).with_description("Readiness check"),
            ),
        }
    }

    if config.log_default_routes {
        routes
    } else {
        routes.into_iter().map(Route::quiet).collect()
    }
}

/// The index route over `bound`, which must already contain the index
/// itself.
pub(crate) fn index_route(config: &RuntimeConfig, bound: Arc<[RouteInfo]>) -> Route {
    let route = Route::new(Method::GET, INDEX_PATH, (config.index_handler)(bound))
        .with_description(INDEX_DESCRIPTION);
    if config.log_default_routes {
        route
    } else {
        route.quiet()
    }
}

pub(crate) const INDEX_DESCRIPTION: &str = "Index of bound routes";
