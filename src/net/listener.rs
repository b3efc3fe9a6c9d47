//! TCP listener binding.
//!
//! # Responsibilities
//! - Parse and resolve `host:port` bind addresses
//! - Bind synchronously so port conflicts surface to the caller
//! - Hand a non-blocking std listener to the serving layer

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, ToSocketAddrs};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The address is not a valid `host:port`.
    #[error("invalid bind address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

fn invalid(address: &str, reason: impl Into<String>) -> ListenerError {
    ListenerError::InvalidAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
}

/// Resolve a `host:port` address. An empty host binds all interfaces and
/// port `0` asks the OS for an ephemeral port.
pub fn resolve_address(address: &str) -> Result<SocketAddr, ListenerError> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid(address, "missing port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| invalid(address, "port must be a number in [0, 65535]"))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(address, e.to_string()))?
        .next()
        .ok_or_else(|| invalid(address, "host did not resolve"))
}

/// Bind a non-blocking listener on `addr`.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(addr).map_err(|source| ListenerError::Bind { address: addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Bind { address: addr, source })?;

    tracing::debug!(address = %addr, "Listener bound");
    Ok(listener)
}
