//! Service runtime library.
//!
//! Starts, wires and stops one or more HTTP listeners under a single
//! process lifecycle. [`bootstrap`] owns the process context, logger and
//! metrics client; the caller's bind function starts servers with
//! [`http::start`].

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::AppConfig;
pub use http::{start, Binder, Route, ServerError, ServerHandle};
pub use lifecycle::{bootstrap, AppContext, BootstrapError};
pub use observability::{BoxError, Logger, Metrics};
