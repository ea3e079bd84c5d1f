//! Records stored in the network map.
//!
//! Every entity carries a version. Two copies of the same entity are ordered
//! by a precedence tuple and the higher one wins, so merging is a
//! last-writer-wins register per entity key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of an endpoint ID.
pub const MAX_ENDPOINT_ID_LEN: usize = 128;

/// Failure-detector status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Alive,
    Suspect,
    Dead,
    Left,
}

impl NodeStatus {
    /// Rank used to break ties between copies with the same version.
    ///
    /// At equal versions a suspicion overrides alive, death overrides
    /// suspicion and a graceful leave overrides everything.
    pub fn rank(self) -> u8 {
        match self {
            NodeStatus::Alive => 0,
            NodeStatus::Suspect => 1,
            NodeStatus::Dead => 2,
            NodeStatus::Left => 3,
        }
    }

    /// Whether requests may be routed to a node in this status.
    pub fn is_routable(self) -> bool {
        self == NodeStatus::Alive
    }

    /// Whether the node is gone and only waits to be reaped.
    pub fn is_gone(self) -> bool {
        matches!(self, NodeStatus::Dead | NodeStatus::Left)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Alive => "alive",
            NodeStatus::Suspect => "suspect",
            NodeStatus::Dead => "dead",
            NodeStatus::Left => "left",
        };
        f.write_str(s)
    }
}

/// Identity and status of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Address other nodes forward proxy requests to.
    pub proxy_addr: String,
    pub admin_addr: String,
    pub gossip_addr: String,
    /// Incarnation. Only the node itself increments it.
    pub version: u64,
    pub status: NodeStatus,
}

impl Node {
    /// Create an alive node at version 0.
    pub fn new(
        id: impl Into<String>,
        proxy_addr: impl Into<String>,
        admin_addr: impl Into<String>,
        gossip_addr: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            proxy_addr: proxy_addr.into(),
            admin_addr: admin_addr.into(),
            gossip_addr: gossip_addr.into(),
            version: 0,
            status: NodeStatus::Alive,
        }
    }

    fn precedence(&self) -> (u64, u8, &str, &str, &str) {
        (
            self.version,
            self.status.rank(),
            &self.proxy_addr,
            &self.admin_addr,
            &self.gossip_addr,
        )
    }

    /// Returns true if `self` wins over `other` when merged.
    pub fn supersedes(&self, other: &Node) -> bool {
        self.precedence() > other.precedence()
    }

    pub fn stamp(&self) -> Stamp {
        Stamp {
            version: self.version,
            rank: self.status.rank(),
        }
    }

    /// Copy of this node with a different status at the same version.
    pub fn with_status(&self, status: NodeStatus) -> Node {
        Node {
            status,
            ..self.clone()
        }
    }
}

/// Upstream listeners a node holds for one endpoint.
///
/// A registration with zero listeners is a tombstone: removal is itself a
/// versioned write so stale copies cannot resurrect the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub node_id: String,
    pub endpoint_id: String,
    pub listeners: u32,
    pub version: u64,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.listeners > 0
    }

    pub fn supersedes(&self, other: &Registration) -> bool {
        (self.version, self.listeners) > (other.version, other.listeners)
    }

    pub fn stamp(&self) -> Stamp {
        Stamp {
            version: self.version,
            rank: 0,
        }
    }
}

/// Identifies one entity in the map.
///
/// The derived ordering is the order digests are chunked in, so it must be
/// identical on every node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKey {
    Node { id: String },
    Registration { node_id: String, endpoint_id: String },
}

/// Summary of an entity's version used by anti-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub version: u64,
    pub rank: u8,
}

/// A unit of replicated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Node(Node),
    Registration(Registration),
}

impl Record {
    pub fn key(&self) -> EntityKey {
        match self {
            Record::Node(node) => EntityKey::Node {
                id: node.id.clone(),
            },
            Record::Registration(reg) => EntityKey::Registration {
                node_id: reg.node_id.clone(),
                endpoint_id: reg.endpoint_id.clone(),
            },
        }
    }

    pub fn stamp(&self) -> Stamp {
        match self {
            Record::Node(node) => node.stamp(),
            Record::Registration(reg) => reg.stamp(),
        }
    }

    /// Owning node of the record.
    pub fn node_id(&self) -> &str {
        match self {
            Record::Node(node) => &node.id,
            Record::Registration(reg) => &reg.node_id,
        }
    }

    /// Structural checks applied to records received from peers.
    pub fn validate(&self) -> Result<(), RecordError> {
        match self {
            Record::Node(node) => {
                if !is_valid_node_id(&node.id) {
                    return Err(RecordError::InvalidNodeId(node.id.clone()));
                }
                if node.proxy_addr.is_empty() || node.gossip_addr.is_empty() {
                    return Err(RecordError::MissingAddress(node.id.clone()));
                }
                Ok(())
            }
            Record::Registration(reg) => {
                if !is_valid_node_id(&reg.node_id) {
                    return Err(RecordError::InvalidNodeId(reg.node_id.clone()));
                }
                if !is_valid_endpoint_id(&reg.endpoint_id) {
                    return Err(RecordError::InvalidEndpointId(reg.endpoint_id.clone()));
                }
                Ok(())
            }
        }
    }
}

impl From<Node> for Record {
    fn from(node: Node) -> Self {
        Record::Node(node)
    }
}

impl From<Registration> for Record {
    fn from(reg: Registration) -> Self {
        Record::Registration(reg)
    }
}

/// Reasons a received record is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),
    #[error("invalid endpoint id: {0:?}")]
    InvalidEndpointId(String),
    #[error("node {0} has no proxy or gossip address")]
    MissingAddress(String),
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Node IDs: 1-64 characters of `[A-Za-z0-9._-]`.
pub fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(is_id_char)
}

/// Endpoint IDs: 1-128 characters of `[A-Za-z0-9._-]`.
pub fn is_valid_endpoint_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ENDPOINT_ID_LEN && id.chars().all(is_id_char)
}

/// Generate a random node ID of 12 lowercase alphanumerics.
pub fn generate_node_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..12)
        .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
        .collect()
}
