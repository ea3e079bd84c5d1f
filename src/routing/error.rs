//! Per-request routing failures.

use axum::http::StatusCode;
use std::time::Duration;

use crate::routing::forward::ForwardError;
use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing endpoint id: set x-endpoint-id or use <endpoint>.<domain> as host")]
    MissingEndpoint,
    #[error("invalid endpoint id {0:?}")]
    InvalidEndpoint(String),
    #[error("no upstream available for {0}")]
    NoUpstream(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("gateway timeout after {0:?}")]
    GatewayTimeout(Duration),
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("reading request body: {0}")]
    BodyRead(String),
    #[error("node is draining")]
    Draining,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingEndpoint
            | ProxyError::InvalidEndpoint(_)
            | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoUpstream(_) => StatusCode::NOT_FOUND,
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ProxyError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Draining => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Label for metrics and status counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MissingEndpoint
            | ProxyError::InvalidEndpoint(_)
            | ProxyError::BodyRead(_) => "bad_request",
            ProxyError::NoUpstream(_) => "no_upstream",
            ProxyError::BadGateway(_) => "bad_gateway",
            ProxyError::GatewayTimeout(_) => "gateway_timeout",
            ProxyError::PayloadTooLarge(_) => "payload_too_large",
            ProxyError::Draining => "draining",
        }
    }
}

impl From<ForwardError> for ProxyError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::Timeout(after) => ProxyError::GatewayTimeout(after),
            other => ProxyError::BadGateway(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        ProxyError::BadGateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (ProxyError::MissingEndpoint, 400),
            (ProxyError::InvalidEndpoint("a b".into()), 400),
            (ProxyError::NoUpstream("svc".into()), 404),
            (ProxyError::BadGateway("refused".into()), 502),
            (ProxyError::GatewayTimeout(Duration::from_secs(1)), 504),
            (ProxyError::PayloadTooLarge(10), 413),
            (ProxyError::BodyRead("reset".into()), 400),
            (ProxyError::Draining, 503),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
        }
    }

    #[test]
    fn forward_timeout_is_gateway_timeout() {
        let err: ProxyError = ForwardError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(err, ProxyError::GatewayTimeout(d) if d == Duration::from_secs(2)));
        assert_eq!(
            ProxyError::NoUpstream("svc-a".into()).to_string(),
            "no upstream available for svc-a"
        );
    }
}
