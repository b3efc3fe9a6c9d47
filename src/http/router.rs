//! Route table and dispatch.
//!
//! # Responsibilities
//! - Register method + path endpoints
//! - Produce the axum router served by a listener
//! - Answer unmatched paths with 404 and unmatched methods with 405
//!
//! # Design Decisions
//! - Path matching is case-sensitive (axum semantics)
//! - Registering the same method + path twice replaces the first endpoint
//! - The table is frozen once converted; serving never mutates it

use axum::{
    http::StatusCode,
    routing::{any, MethodRouter},
};

use crate::http::Method;
use crate::observability::Metrics;

/// Metric label for requests with no matching path.
pub const NOT_FOUND_ROUTE: &str = "404";

/// Metric label for requests with a matching path but no matching method.
pub const METHOD_NOT_ALLOWED_ROUTE: &str = "405";

/// The router capability a server registers its routes on.
pub trait Router: Send {
    /// Register `endpoint` for `method` on `path`. A later registration for
    /// the same pair replaces the earlier one.
    fn register(&mut self, method: Method, path: &str, endpoint: MethodRouter);

    /// Freeze the table into the service the listener dispatches to.
    fn into_axum(self: Box<Self>, metrics: &Metrics) -> axum::Router;
}

/// Default [`Router`]: a path → method table served by axum.
#[derive(Default)]
pub struct DefaultRouter {
    paths: Vec<(String, Vec<(Method, MethodRouter)>)>,
}

impl DefaultRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered method + path pairs.
    pub fn len(&self) -> usize {
        self.paths.iter().map(|(_, methods)| methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Router for DefaultRouter {
    fn register(&mut self, method: Method, path: &str, endpoint: MethodRouter) {
        let index = match self.paths.iter().position(|(p, _)| p == path) {
            Some(index) => index,
            None => {
                self.paths.push((path.to_string(), Vec::new()));
                self.paths.len() - 1
            }
        };

        let methods = &mut self.paths[index].1;
        match methods.iter().position(|(m, _)| *m == method) {
            Some(slot) => methods[slot].1 = endpoint,
            None => methods.push((method, endpoint)),
        }
    }

    fn into_axum(self: Box<Self>, metrics: &Metrics) -> axum::Router {
        let method_not_allowed = metrics.instrument(
            any(|| async { (StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed") }),
            METHOD_NOT_ALLOWED_ROUTE,
            false,
        );
        let not_found = metrics.instrument(
            any(|| async { (StatusCode::NOT_FOUND, "404 page not found") }),
            NOT_FOUND_ROUTE,
            false,
        );

        let mut app = axum::Router::new();
        for (path, methods) in self.paths {
            let endpoint = methods
                .into_iter()
                .fold(MethodRouter::new(), |acc, (_, endpoint)| acc.merge(endpoint))
                .fallback_service(method_not_allowed.clone());
            app = app.route(&path, endpoint);
        }
        app.fallback_service(not_found)
    }
}
