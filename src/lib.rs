//! Clustered reverse proxy for upstreams that dial in.
//!
//! Upstreams open a WebSocket to any node and register an endpoint. Nodes
//! gossip a network map of who serves what, so a request arriving anywhere is
//! served locally or forwarded one hop to a node holding a listener.

pub mod admin;
pub mod config;
pub mod error;
pub mod gossip;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod netmap;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod upstream;

pub use config::ServerConfig;
pub use error::Error;
pub use lifecycle::Server;
