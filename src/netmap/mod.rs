//! Cluster membership and endpoint ownership.
//!
//! # Data Flow
//! ```text
//! gossip (peer records) ──merge──▶ NetworkMap ◀──add/remove── upstream sessions
//!                                     │
//!                     load()/resolve()│ (lock-free snapshots)
//!                                     ▼
//!                      routing, gossip digests, admin status
//! ```
//!
//! Every entity is a last-writer-wins register keyed by [`EntityKey`]. The
//! local node is the only author of its own records.

pub mod map;
pub mod node;
pub mod state;
pub mod status;

pub use map::{NetworkMap, Owner};
pub use node::{
    generate_node_id, is_valid_endpoint_id, is_valid_node_id, EntityKey, Node, NodeStatus,
    Record, RecordError, Registration, Stamp,
};
pub use state::{Digest, NetworkState};
