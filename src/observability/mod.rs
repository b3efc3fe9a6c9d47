//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Bootstrap builds:
//!     → metrics.rs (owned Prometheus recorder)
//!     → logging.rs (log layer + level counter → Logger)
//!
//! Consumers:
//!     → every spawned task and request runs under the Logger
//!     → every route is wrapped by Metrics::instrument
//!     → /metrics renders the recorder
//! ```
//!
//! # Design Decisions
//! - Nothing is installed globally; both clients are threaded explicitly
//! - Log volume by level is itself a metric

pub mod logging;
pub mod metrics;

pub use logging::{BoxError, Logger, LoggingConfig};
pub use metrics::{Metrics, MetricsConfig};
