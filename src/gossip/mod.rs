//! Gossip transport subsystem.
//!
//! # Data Flow
//! ```text
//! UDP datagram
//!     → transport.rs (decode JSON message, count)
//!     → gossiper.rs (merge piggybacked records into the NetworkMap,
//!                    answer pings, relay ping_reqs, answer digests)
//!
//! Periodic loops (gossiper.rs):
//!     anti-entropy: digest chunks → delta + wants → final delta
//!     failure detector: ping → ping_req ×k → suspect → dead → reaped
//!     push: local map change → push to fanout peers
//! ```
//!
//! # Design Decisions
//! - Peer errors are transient: logged and retried next round
//! - Only binding the socket is fatal
//! - Merging is idempotent, so duplicated or reordered datagrams are harmless

pub mod anti_entropy;
pub mod detector;
pub mod gossiper;
pub mod join;
pub mod message;
pub mod status;
pub mod transport;

use std::net::SocketAddr;
use std::time::Duration;

pub use gossiper::Gossip;
pub use message::Message;

/// Error type for gossip operations.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} message is {size} bytes, over the datagram limit")]
    TooLarge { kind: &'static str, size: usize },
    #[error("send to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("join failed: none of {attempted} candidates answered")]
    Join { attempted: usize },
    #[error("join failed: no join entry resolved")]
    Unresolved,
    #[error("leave not acknowledged within {0:?}")]
    LeaveTimeout(Duration),
}
