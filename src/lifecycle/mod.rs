//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     bind gossip UDP → bind proxy TCP → bind admin TCP
//!     → build map, gossip, registry, router → join → ready
//!
//! Run (group.rs):
//!     signal | proxy | admin | gossip, first to return stops the rest
//!
//! Shutdown (shutdown.rs):
//!     leave cluster → drain proxy → drain admin → stop gossip
//!     each drain is bounded; past the deadline the server is dropped
//! ```

pub mod group;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use group::RunGroup;
pub use shutdown::Shutdown;
pub use startup::{BoundAddrs, Server};
