//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (x-endpoint-id or host)
//!     → matcher.rs (endpoint id)
//!     → router.rs (NetworkMap::resolve)
//!         ├─ local owner  → UpstreamRegistry → upstream connection
//!         └─ remote owner → forward.rs (hyper client, gateway timeout)
//!                            └─ connect failure → one retry if the owner changed
//!     → error.rs (typed failure → HTTP status)
//! ```
//!
//! # Design Decisions
//! - Resolution reads a lock-free snapshot per request
//! - Forwarded requests never forward again
//! - Every path to an upstream is bounded by the gateway timeout

pub mod error;
pub mod forward;
pub mod matcher;
pub mod router;
pub mod status;

pub use error::ProxyError;
pub use forward::{ForwardError, Forwarder};
pub use router::ProxyRouter;
