//! Upstream listener connections.
//!
//! # Data Flow
//! ```text
//! upstream process ──WebSocket──▶ http/websocket.rs (session)
//!                                     │ register / unregister
//!                                     ▼
//!                              registry.rs ──▶ NetworkMap listener counts
//!                                     │ select (round robin)
//!                                     ▼
//! router ──Request<Bytes>──▶ conn.rs ──codec.rs frames──▶ upstream
//! ```

pub mod codec;
pub mod conn;
pub mod registry;

pub use conn::{FramedConn, UpstreamConn};
pub use registry::UpstreamRegistry;

use codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream connection closed")]
    Closed,
    #[error("upstream sent a request frame ({0})")]
    UnexpectedFrame(u64),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
