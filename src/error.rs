//! Crate-level error returned by startup and the run group.

use crate::config::ConfigError;
use crate::gossip::GossipError;
use crate::net::addr::AddrError;
use crate::net::listener::ListenerError;
use crate::observability::logging::LoggingError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("advertise address: {0}")]
    Advertise(#[from] AddrError),
    #[error(transparent)]
    Gossip(#[from] GossipError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{server} server failed: {source}")]
    Serve {
        server: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("actor panicked: {0}")]
    Panicked(String),
}
