//! Retry policy for forwards.
//!
//! # Responsibilities
//! - Decide whether a failed forward may be retried
//! - Keep what is needed to rebuild the request for the retry
//!
//! # Design Decisions
//! - At most one retry, never a loop
//! - Only when the owner could not be reached, so the request never ran
//! - Only for empty bodies, which can be rebuilt without buffering
//! - Only when the map now names a different owner

use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, Method, Request, Uri, Version};

use crate::http::request::is_upgrade;
use crate::netmap::Owner;
use crate::routing::forward::ForwardError;

/// Head of a request that may be sent a second time.
#[derive(Debug, Clone)]
pub struct RetryableRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl RetryableRequest {
    /// Capture the request head if the request could be retried at all.
    pub fn capture(request: &Request<Body>) -> Option<Self> {
        if is_upgrade(request.headers()) || request.body().size_hint().exact() != Some(0) {
            return None;
        }
        Some(Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        })
    }

    pub fn rebuild(self) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers;
        request
    }
}

/// Whether to retry a failed forward to `failed` against `next`.
pub fn should_retry(err: &ForwardError, failed: &Owner, next: Option<&Owner>) -> bool {
    err.is_connect() && next.is_some_and(|next| next.node_id != failed.node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn owner(id: &str) -> Owner {
        Owner {
            node_id: id.into(),
            proxy_addr: "127.0.0.1:1".into(),
            local: false,
        }
    }

    #[test]
    fn only_empty_plain_requests_are_captured() {
        let get = Request::builder()
            .uri("/a?b=c")
            .header("x-tag", "1")
            .body(Body::empty())
            .unwrap();
        let captured = RetryableRequest::capture(&get).unwrap().rebuild();
        assert_eq!(captured.uri(), "/a?b=c");
        assert_eq!(captured.headers()["x-tag"], "1");

        let post = Request::new(Body::from("payload"));
        assert!(RetryableRequest::capture(&post).is_none());

        let upgrade = Request::builder()
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        assert!(RetryableRequest::capture(&upgrade).is_none());
    }

    #[test]
    fn retries_only_connect_failures_to_a_new_owner() {
        let timeout = ForwardError::Timeout(Duration::from_secs(1));
        let a = owner("a");
        let b = owner("b");

        assert!(!should_retry(&timeout, &a, Some(&b)));
        assert!(!should_retry(
            &ForwardError::InvalidAddr("x".into()),
            &a,
            Some(&b)
        ));
    }
}
