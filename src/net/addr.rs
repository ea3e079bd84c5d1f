//! Address parsing and advertise-address derivation.
//!
//! Bind addresses may omit the host (`:8080`), meaning every interface.
//! Advertise addresses are what other nodes dial, so an unspecified bind host
//! is replaced with this machine's private IPv4 address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    #[error("invalid address {addr:?}: {reason}")]
    Invalid { addr: String, reason: &'static str },
    #[error("no private IPv4 address found")]
    NoPrivateIp,
    #[error("private IP detection failed: {0}")]
    Detect(#[source] std::io::Error),
}

fn invalid(addr: &str, reason: &'static str) -> AddrError {
    AddrError::Invalid {
        addr: addr.to_string(),
        reason,
    }
}

/// Parse a bind address. A leading `:` binds every IPv4 interface.
pub fn parse_bind_addr(addr: &str) -> Result<SocketAddr, AddrError> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    full.parse()
        .map_err(|_| invalid(addr, "expected [ip]:port"))
}

/// Split `host[:port]`, using `default_port` when the port is omitted.
///
/// IPv6 hosts are written in brackets when a port is given (`[::1]:7000`);
/// a bare IPv6 literal takes the default port.
pub fn split_host_port(entry: &str, default_port: u16) -> Result<(String, u16), AddrError> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(invalid(entry, "empty host"));
    }

    if let Some(rest) = entry.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid(entry, "unclosed bracket"))?;
        let port = match tail {
            "" => default_port,
            _ => parse_port(entry, tail.strip_prefix(':').unwrap_or(tail))?,
        };
        if host.is_empty() {
            return Err(invalid(entry, "empty host"));
        }
        return Ok((host.to_string(), port));
    }

    match entry.matches(':').count() {
        0 => Ok((entry.to_string(), default_port)),
        1 => {
            let (host, port) = entry
                .split_once(':')
                .ok_or_else(|| invalid(entry, "expected host:port"))?;
            if host.is_empty() {
                return Err(invalid(entry, "empty host"));
            }
            Ok((host.to_string(), parse_port(entry, port)?))
        }
        _ => {
            let ip: IpAddr = entry
                .parse()
                .map_err(|_| invalid(entry, "bracket IPv6 hosts when giving a port"))?;
            Ok((ip.to_string(), default_port))
        }
    }
}

fn parse_port(entry: &str, port: &str) -> Result<u16, AddrError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid(entry, "invalid port")),
        Ok(port) => Ok(port),
    }
}

/// Check an operator-supplied advertise address.
pub fn validate_advertise_addr(addr: &str) -> Result<(), AddrError> {
    if !addr.contains(':') {
        return Err(invalid(addr, "expected host:port"));
    }
    split_host_port(addr, 0).map(|_| ())
}

/// Address of the interface used for outbound traffic, if it is private.
pub async fn private_ipv4() -> Result<Ipv4Addr, AddrError> {
    // Connecting a UDP socket sends nothing; it only selects a route.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(AddrError::Detect)?;
    socket
        .connect((Ipv4Addr::new(10, 254, 254, 254), 9))
        .await
        .map_err(AddrError::Detect)?;
    match socket.local_addr().map_err(AddrError::Detect)?.ip() {
        IpAddr::V4(ip) if ip.is_private() => Ok(ip),
        _ => Err(AddrError::NoPrivateIp),
    }
}

/// Derive the address other nodes should use from an actually bound address.
pub async fn advertise_addr_from_bind_addr(bound: SocketAddr) -> Result<String, AddrError> {
    if !bound.ip().is_unspecified() {
        return Ok(bound.to_string());
    }
    let ip = private_ipv4().await?;
    Ok(SocketAddr::new(IpAddr::V4(ip), bound.port()).to_string())
}

/// Use the configured advertise address, or derive one from the bound address.
pub async fn resolve_advertise_addr(
    configured: Option<&str>,
    bound: SocketAddr,
) -> Result<String, AddrError> {
    match configured {
        Some(addr) => {
            validate_advertise_addr(addr)?;
            Ok(addr.to_string())
        }
        None => advertise_addr_from_bind_addr(bound).await,
    }
}
