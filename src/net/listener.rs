//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind every port before any server starts accepting
//! - Tell "port in use" apart from other bind failures
//!
//! # Design Decisions
//! - Listeners are bound with std and handed to `axum_server::from_tcp`, so
//!   a failed bind never leaves a half-started server behind

use std::net::{SocketAddr, TcpListener};

use thiserror::Error;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("port {port} is already in use")]
    AddrInUse { port: u16 },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    pub fn port(&self) -> u16 {
        match self {
            ListenerError::AddrInUse { port } => *port,
            ListenerError::Bind { addr, .. } => addr.port(),
        }
    }
}

/// Bind all interfaces on `port`.
pub fn bind(port: u16) -> Result<TcpListener, ListenerError> {
    bind_addr(SocketAddr::from(([0, 0, 0, 0], port)))
}

/// Bind `addr` and switch the socket to non-blocking for the async runtime.
pub fn bind_addr(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(addr).map_err(|source| match source.kind() {
        std::io::ErrorKind::AddrInUse => ListenerError::AddrInUse { port: addr.port() },
        _ => ListenerError::Bind { addr, source },
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Bind { addr, source })?;

    tracing::info!(address = %addr, "Listener bound");
    Ok(listener)
}
