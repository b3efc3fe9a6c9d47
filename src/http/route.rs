//! Route definitions and the binder capability.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::Request, handler::Handler, response::Response, routing::MethodRouter};
use serde::Serialize;
use tower::util::BoxCloneSyncService;
use tower::Service;

use crate::http::Method;
use crate::lifecycle::AppContext;

/// A type-erased request handler.
#[derive(Clone)]
pub struct Endpoint(BoxCloneSyncService<Request, Response, Infallible>);

impl Endpoint {
    /// Erase any axum handler function.
    pub fn handler<H, T>(handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self(BoxCloneSyncService::new(handler.with_state(())))
    }

    /// Erase a tower service.
    pub fn service<S>(service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self(BoxCloneSyncService::new(service))
    }

    pub(crate) fn into_service(self) -> BoxCloneSyncService<Request, Response, Infallible> {
        self.0
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Endpoint")
    }
}

/// Middleware applied to a single route.
pub type RouteLayer = Arc<dyn Fn(MethodRouter) -> MethodRouter + Send + Sync>;

/// One registrable endpoint.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub description: String,
    pub(crate) endpoint: Endpoint,
    pub(crate) middleware: Vec<RouteLayer>,
    pub(crate) quiet: bool,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            method,
            path: path.into(),
            description: String::new(),
            endpoint,
            middleware: Vec::new(),
            quiet: false,
        }
    }

    /// Shorthand for a `GET` route backed by a handler function.
    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::GET, path, Endpoint::handler(handler))
    }

    /// Shorthand for a `POST` route backed by a handler function.
    pub fn post<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::POST, path, Endpoint::handler(handler))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add route middleware. Layers apply in the order added, the last
    /// one outermost.
    pub fn with_middleware<F>(mut self, layer: F) -> Self
    where
        F: Fn(MethodRouter) -> MethodRouter + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(layer));
        self
    }

    /// Suppress the per-request completion log. Metrics are still recorded.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            method: self.method.to_string(),
            path: self.path.clone(),
            description: self.description.clone(),
        }
    }

    pub(crate) fn key(&self) -> (&Method, &str) {
        (&self.method, &self.path)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("description", &self.description)
            .field("middleware", &self.middleware.len())
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// What the index route reports for each bound route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub description: String,
}

/// Supplies the custom routes of one server.
pub trait Binder: Send + Sync {
    /// Called exactly once per server start.
    fn bind_http(&self, ctx: &AppContext) -> Vec<Route>;
}

impl<F> Binder for F
where
    F: Fn(&AppContext) -> Vec<Route> + Send + Sync,
{
    fn bind_http(&self, ctx: &AppContext) -> Vec<Route> {
        self(ctx)
    }
}

/// Binder for servers that only expose default routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBinder;

impl Binder for NoopBinder {
    fn bind_http(&self, _ctx: &AppContext) -> Vec<Route> {
        Vec::new()
    }
}

/// Collapse routes sharing a method and path, keeping the position of the
/// first registration and the value of the last. Returns the replaced keys.
pub(crate) fn dedupe(routes: Vec<Route>) -> (Vec<Route>, Vec<RouteInfo>) {
    let mut merged: Vec<Route> = Vec::with_capacity(routes.len());
    let mut shadowed = Vec::new();
    for route in routes {
        match merged.iter_mut().find(|existing| existing.key() == route.key()) {
            Some(existing) => {
                shadowed.push(existing.info());
                *existing = route;
            }
            None => merged.push(route),
        }
    }
    (merged, shadowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn test_dedupe_last_wins_in_first_position() {
        let routes = vec![
            Route::get("/a", ok).with_description("first"),
            Route::get("/b", ok),
            Route::get("/a", ok).with_description("second"),
            Route::post("/a", ok),
        ];
        let (merged, shadowed) = dedupe(routes);

        let infos: Vec<_> = merged.iter().map(Route::info).collect();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].path, "/a");
        assert_eq!(infos[0].description, "second");
        assert_eq!(infos[2].method, "POST");
        assert_eq!(shadowed.len(), 1);
        assert_eq!(shadowed[0].description, "first");
    }

    #[test]
    fn test_paths_are_case_sensitive() {
        let (merged, shadowed) = dedupe(vec![Route::get("/Ping", ok), Route::get("/ping", ok)]);
        assert_eq!(merged.len(), 2);
        assert!(shadowed.is_empty());
    }
}
