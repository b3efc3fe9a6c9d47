//! HTTP server manager.
//!
//! # Responsibilities
//! - Resolve options into a validated [`RuntimeConfig`]
//! - Merge default and caller routes, register them instrumented
//! - Bind the listener before returning, so conflicts are reported
//! - Serve until the application context is cancelled, then drain
//!
//! # Design Decisions
//! - Everything that can fail does so before the first accept and is
//!   returned; serving and shutdown failures are logged and counted
//! - Serving and shutdown watching are two tracked tasks, so bootstrap
//!   waits for the listener to close before reporting the stop
//! - Handler panics are contained at the router boundary
//! - Paths are checked against the same matcher axum uses, so a pattern
//!   it would refuse is an error from `start` rather than a panic

use std::any::Any;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{on_service, MethodFilter},
};
use hyper_util::rt::TokioTimer;
use tokio::sync::oneshot;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::http::defaults;
use crate::http::options::{self, DefaultRoute, RuntimeConfig, ServerOption};
use crate::http::request::{request_context, RequestContextState};
use crate::http::route::{dedupe, Binder, Route, RouteInfo};
use crate::http::Method;
use crate::lifecycle::AppContext;
use crate::net::listener::{self, ListenerError};
use crate::net::tls::TlsError;
use crate::observability::Metrics;

/// Error type for starting a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    InvalidAddress(ListenerError),

    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid TLS material: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Bind(ListenerError),

    #[error("unsupported method {method} on route {path}")]
    UnsupportedMethod { method: Method, path: String },

    #[error("invalid route path '{path}': {reason}")]
    InvalidRoute { path: String, reason: String },
}

impl From<ListenerError> for ServerError {
    fn from(e: ListenerError) -> Self {
        match e {
            ListenerError::InvalidAddress { .. } => ServerError::InvalidAddress(e),
            ListenerError::Bind { .. } => ServerError::Bind(e),
        }
    }
}

/// A running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    routes: Arc<[RouteInfo]>,
}

impl ServerHandle {
    /// Address actually bound, with the OS-assigned port for `:0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Every bound route, in registration order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }
}

/// Start an HTTP server under `ctx`.
///
/// Returns once the listener is bound. The server stops when `ctx` is
/// cancelled, giving in-flight requests up to the shutdown timeout.
/// Must be called within a Tokio runtime.
pub fn start(
    ctx: &AppContext,
    binder: &impl Binder,
    options: impl IntoIterator<Item = ServerOption>,
) -> Result<ServerHandle, ServerError> {
    ctx.logger().in_scope(|| start_in_scope(ctx, binder, options))
}

fn start_in_scope(
    ctx: &AppContext,
    binder: &impl Binder,
    options: impl IntoIterator<Item = ServerOption>,
) -> Result<ServerHandle, ServerError> {
    let mut config = options::apply(RuntimeConfig::new(ctx.metrics()), options)?;
    let (address, request_id_header) = config.validate()?;

    let mut routes = defaults::build(&config);
    routes.extend(binder.bind_http(ctx));
    let (routes, shadowed) = dedupe(routes);
    for info in &shadowed {
        tracing::warn!(method = %info.method, path = %info.path, "Route registered twice, keeping the last");
    }

    let index_enabled = config.default_routes.contains(&DefaultRoute::Index);
    let mut paths = PathValidator::default();
    let mut bound: Vec<RouteInfo> = Vec::with_capacity(routes.len() + 1);
    for route in routes {
        if index_enabled && route.method == Method::GET && route.path == defaults::INDEX_PATH {
            tracing::warn!(path = %route.path, "Route shadowed by the index route");
            continue;
        }
        paths.check(&route.path)?;
        bound.push(route.info());
        register(&mut config, ctx.metrics(), route)?;
    }

    if index_enabled {
        bound.push(RouteInfo {
            method: Method::GET.to_string(),
            path: defaults::INDEX_PATH.to_string(),
            description: defaults::INDEX_DESCRIPTION.to_string(),
        });
    }
    let bound: Arc<[RouteInfo]> = bound.into();
    if index_enabled {
        let index = defaults::index_route(&config, bound.clone());
        paths.check(&index.path)?;
        register(&mut config, ctx.metrics(), index)?;
    }

    let listener = listener::bind(address)?;
    let local_addr = listener.local_addr().map_err(|source| {
        ServerError::Bind(ListenerError::Bind { address, source })
    })?;

    let RuntimeConfig {
        read_timeout,
        write_timeout,
        shutdown_timeout,
        tls,
        router,
        middleware,
        ..
    } = config;

    let mut app = router.into_axum(ctx.metrics());
    for layer in &middleware {
        app = layer(app);
    }
    let app = app
        .layer(CatchPanicLayer::custom(PanicResponder {
            metrics: ctx.metrics().clone(),
        }))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, write_timeout))
        .layer(from_fn_with_state(
            RequestContextState {
                header: request_id_header,
                logger: ctx.logger().clone(),
            },
            request_context,
        ));

    let handle = axum_server::Handle::new();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let tls_enabled = tls.is_some();

    let serve_handle = handle.clone();
    let metrics = ctx.metrics().clone();
    ctx.spawn(async move {
        let served = match tls {
            Some(material) => {
                let mut server =
                    axum_server::tls_rustls::from_tcp_rustls(listener, material.rustls_config()).handle(serve_handle);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout);
                server.serve(make_service).await
            }
            None => {
                let mut server = axum_server::from_tcp(listener).handle(serve_handle);
                server
                    .http_builder()
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout);
                server.serve(make_service).await
            }
        };

        match served {
            Ok(()) => tracing::info!(address = %local_addr, "HTTP server stopped"),
            Err(e) => {
                tracing::error!(address = %local_addr, error = %e, "HTTP server failed");
                metrics.increment_task("http_server", "serve", "error");
            }
        }
        let _ = done_tx.send(());
    });

    let token = ctx.token().clone();
    let metrics = ctx.metrics().clone();
    ctx.spawn(async move {
        token.cancelled().await;
        tracing::info!(
            address = %local_addr,
            connections = handle.connection_count(),
            timeout_secs = shutdown_timeout.as_secs_f64(),
            "HTTP server shutting down"
        );
        // The deadline is enforced here, so the outcome does not race the
        // server's own timer.
        handle.graceful_shutdown(None);

        let mut done_rx = done_rx;
        match tokio::time::timeout(shutdown_timeout, &mut done_rx).await {
            Ok(_) => metrics.increment_task("http_server", "shutdown", "ok"),
            Err(_) => {
                tracing::warn!(
                    address = %local_addr,
                    connections = handle.connection_count(),
                    "Graceful shutdown timed out, closing remaining connections"
                );
                metrics.increment_task("http_server", "shutdown", "timeout");
                handle.shutdown();
                let _ = done_rx.await;
            }
        }
    });

    tracing::info!(address = %local_addr, tls = tls_enabled, routes = bound.len(), "HTTP server listening");

    Ok(ServerHandle {
        local_addr,
        routes: bound,
    })
}

/// Path templates accepted so far, in the matcher the router dispatches with.
#[derive(Default)]
struct PathValidator {
    matcher: matchit::Router<()>,
    seen: HashSet<String>,
}

impl PathValidator {
    /// Accept `path` unless axum would refuse it. Several methods may share
    /// one path, so a path already accepted passes again.
    fn check(&mut self, path: &str) -> Result<(), ServerError> {
        if self.seen.contains(path) {
            return Ok(());
        }
        let invalid = |reason: String| ServerError::InvalidRoute {
            path: path.to_string(),
            reason,
        };

        if !path.starts_with('/') {
            return Err(invalid("must start with '/'".into()));
        }
        if let Some(segment) = path.split('/').find(|s| s.starts_with(':') || s.starts_with('*')) {
            return Err(invalid(format!(
                "segment '{segment}' uses a legacy capture, write '{{name}}' or '{{*name}}' instead"
            )));
        }
        self.matcher.insert(path, ()).map_err(|e| invalid(e.to_string()))?;
        self.seen.insert(path.to_string());
        Ok(())
    }
}

fn register(config: &mut RuntimeConfig, metrics: &Metrics, route: Route) -> Result<(), ServerError> {
    let filter = MethodFilter::try_from(route.method.clone()).map_err(|_| ServerError::UnsupportedMethod {
        method: route.method.clone(),
        path: route.path.clone(),
    })?;

    let mut endpoint = on_service(filter, route.endpoint.into_service());
    for layer in &route.middleware {
        endpoint = layer(endpoint);
    }
    let endpoint = metrics.instrument(endpoint, route.path.clone(), route.quiet);

    tracing::debug!(method = %route.method, path = %route.path, "Route registered");
    config.router.register(route.method, &route.path, endpoint);
    Ok(())
}

/// Turns a handler panic into a `500`.
#[derive(Clone)]
struct PanicResponder {
    metrics: Metrics,
}

impl tower_http::catch_panic::ResponseForPanic for PanicResponder {
    type ResponseBody = axum::body::Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response {
        let message = err
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| err.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic");
        tracing::error!(panic = %message, "Handler panicked");
        self.metrics.increment_task("http", "panic", "500");
        (StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error").into_response()
    }
}
