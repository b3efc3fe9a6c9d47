//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (bootstrap.rs):
//!     Build metrics → Build logger → AppContext → bind fn → "started"
//!
//! Shutdown:
//!     signals.rs (SIGTERM/SIGINT) or caller cancel
//!     → CancellationToken cancelled (context.rs)
//!     → every server drains within its shutdown timeout
//!     → TaskTracker drained → "stopped"
//! ```
//!
//! # Design Decisions
//! - Ordered startup: observability first, then listeners
//! - Cancellation is cooperative and idempotent
//! - Shutdown has a per-listener deadline; nothing waits forever on a client

pub mod bootstrap;
pub mod context;
pub mod signals;

pub use bootstrap::{bootstrap, BootstrapConfig, BootstrapError, BootstrapOption};
pub use context::AppContext;
