//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured "host:port"
//!     → listener.rs (resolve, bind synchronously, non-blocking)
//!     → tls.rs (optional rustls acceptor from PEM bytes)
//!     → Hand off to the HTTP server
//! ```
//!
//! # Design Decisions
//! - Binding happens before the server is spawned so port conflicts are
//!   returned, not logged
//! - TLS is optional; when present the protocol floor is TLS 1.2

pub mod listener;
pub mod tls;
