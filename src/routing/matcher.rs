//! Endpoint identification.
//!
//! # Responsibilities
//! - Read the target endpoint from `x-endpoint-id`
//! - Fall back to the first label of the host (`svc-a.example.com` → `svc-a`)
//! - Reject IDs outside `[A-Za-z0-9._-]{1,128}`
//!
//! # Design Decisions
//! - The header wins over the host so forwarded hops never re-parse hosts
//! - IP hosts and single-label hosts carry no endpoint

use axum::http::{header::HOST, Request};
use std::net::IpAddr;

use crate::http::request::X_ENDPOINT_ID;
use crate::netmap::is_valid_endpoint_id;
use crate::routing::error::ProxyError;

/// Endpoint a request targets.
pub fn endpoint_id<B>(request: &Request<B>) -> Result<String, ProxyError> {
    if let Some(value) = request.headers().get(X_ENDPOINT_ID) {
        let id = value
            .to_str()
            .map_err(|_| ProxyError::InvalidEndpoint(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
        return validate(id.trim());
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .ok_or(ProxyError::MissingEndpoint)?;
    host_label(host)
        .ok_or(ProxyError::MissingEndpoint)
        .and_then(validate)
}

fn validate(id: &str) -> Result<String, ProxyError> {
    if is_valid_endpoint_id(id) {
        Ok(id.to_string())
    } else {
        Err(ProxyError::InvalidEndpoint(id.to_string()))
    }
}

/// First label of a DNS host name with at least two labels.
pub fn host_label(host: &str) -> Option<&str> {
    if host.starts_with('[') {
        return None;
    }
    let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
    if name.parse::<IpAddr>().is_ok() {
        return None;
    }
    let (first, rest) = name.split_once('.')?;
    if first.is_empty() || rest.is_empty() {
        return None;
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/path");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn header_takes_precedence() {
        let req = request(&[("x-endpoint-id", "svc-a"), ("host", "other.example.com")]);
        assert_eq!(endpoint_id(&req).unwrap(), "svc-a");
    }

    #[test]
    fn falls_back_to_host_label() {
        let req = request(&[("host", "svc-b.proxy.internal:8080")]);
        assert_eq!(endpoint_id(&req).unwrap(), "svc-b");
    }

    #[test]
    fn hosts_without_endpoint() {
        for host in ["localhost:8080", "127.0.0.1:8080", "[::1]:8080", ".example.com"] {
            let req = request(&[("host", host)]);
            assert!(
                matches!(endpoint_id(&req), Err(ProxyError::MissingEndpoint)),
                "{host}"
            );
        }
        assert!(matches!(
            endpoint_id(&request(&[])),
            Err(ProxyError::MissingEndpoint)
        ));
    }

    #[test]
    fn rejects_invalid_ids() {
        let req = request(&[("x-endpoint-id", "svc/a")]);
        assert!(matches!(endpoint_id(&req), Err(ProxyError::InvalidEndpoint(_))));

        let long = "a".repeat(129);
        let req = request(&[("x-endpoint-id", long.as_str())]);
        assert!(matches!(endpoint_id(&req), Err(ProxyError::InvalidEndpoint(_))));
    }
}
