//! Error responses.
//!
//! # Design Decisions
//! - Routing failures are plain text with the status from [`ProxyError::status`]
//! - Backend timeouts result in 504 Gateway Timeout

use axum::response::{IntoResponse, Response};

use crate::routing::ProxyError;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
