//! Listener binding.
//!
//! # Responsibilities
//! - Bind the proxy and admin TCP listeners and the gossip UDP socket
//! - Report the actually bound address (port 0 binds an ephemeral port)
//! - Turn bind failures into a typed, fatal startup error

use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};

use crate::net::addr::{parse_bind_addr, AddrError};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Address(#[from] AddrError),
    /// Failed to bind to address.
    #[error("failed to bind {name} listener on {addr}: {source}")]
    Bind {
        name: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind a TCP listener for the named server.
pub async fn bind_tcp(name: &'static str, addr: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_bind_addr(addr)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { name, addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { name, addr, source })?;

    tracing::info!(listener = name, address = %local_addr, "Listener bound");
    Ok(listener)
}

/// Bind a UDP socket for the named server.
pub async fn bind_udp(name: &'static str, addr: &str) -> Result<UdpSocket, ListenerError> {
    let addr = parse_bind_addr(addr)?;
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { name, addr, source })?;
    let local_addr = socket
        .local_addr()
        .map_err(|source| ListenerError::Bind { name, addr, source })?;

    tracing::info!(listener = name, address = %local_addr, "Socket bound");
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn port_in_use_is_a_bind_error() {
        let first = bind_tcp("proxy", "127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();
        let err = bind_tcp("admin", &addr).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { name: "admin", .. }));
    }

    #[tokio::test]
    async fn rejects_unparsable_address() {
        let err = bind_udp("gossip", "nowhere").await.unwrap_err();
        assert!(matches!(err, ListenerError::Address(_)));
    }
}
