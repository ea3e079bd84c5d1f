//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request IDs, tracing)
//!     ├─ /_upstream/v1/{endpoint_id} → websocket.rs (upstream session)
//!     └─ everything else → routing (local upstream or forward)
//!     → response.rs (typed failures → status + text)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{X_ENDPOINT_ID, X_FORWARDED_NODE, X_REQUEST_ID};
pub use server::{ProxyServer, UPSTREAM_PATH};
