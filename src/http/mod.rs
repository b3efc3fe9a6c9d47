//! HTTP server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (listener bound by server.rs)
//!     → request.rs (request ID, request-scoped logger)
//!     → write timeout, panic recovery, custom middleware
//!     → router.rs (method + path dispatch, 404 / 405)
//!     → per-route instrumentation (observability::metrics)
//!     → route middleware → endpoint (defaults.rs or caller routes)
//! ```

pub mod defaults;
pub mod options;
pub mod pprof;
pub mod request;
pub mod route;
pub mod router;
pub mod server;

pub use axum::http::Method;

pub use defaults::IpLookup;
pub use options::{DefaultRoute, RuntimeConfig, ServerOption};
pub use request::{RequestContext, X_REQUEST_ID};
pub use route::{Binder, Endpoint, NoopBinder, Route, RouteInfo};
pub use router::{DefaultRouter, Router};
pub use server::{start, ServerError, ServerHandle};
