//! Gossip wire messages.
//!
//! Every datagram holds one JSON object tagged by `type`. Lists that can grow
//! with the cluster are split over several datagrams by [`chunk`].

use serde::{Deserialize, Serialize};

use crate::netmap::{EntityKey, Record, Stamp};

/// Largest payload we put in one datagram.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Budget for the variable part of a message, leaving room for the envelope.
const CHUNK_BYTES: usize = 60 * 1024;

/// Records per datagram.
pub const RECORDS_PER_MESSAGE: usize = 100;

/// Digest entries per datagram.
pub const DIGEST_ENTRIES_PER_MESSAGE: usize = 256;

/// One digest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub key: EntityKey,
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Liveness probe. Carries the prober's own record and, if the prober
    /// doubts the target, its view of the target so the target can refute.
    Ping {
        seq: u64,
        from: String,
        records: Vec<Record>,
    },
    /// Answer to a ping or push. Carries the responder's own record.
    Ack {
        seq: u64,
        from: String,
        records: Vec<Record>,
    },
    /// Ask the receiver to ping `target` and relay the ack.
    PingReq {
        seq: u64,
        from: String,
        target: String,
        target_addr: String,
    },
    /// Entity versions for the key range `(lower, upper]`. `None` bounds are
    /// open.
    Digest {
        from: String,
        lower: Option<EntityKey>,
        upper: Option<EntityKey>,
        entries: Vec<DigestEntry>,
    },
    /// Records the receiver lacks, and keys the sender wants in return.
    Delta {
        from: String,
        records: Vec<Record>,
        wants: Vec<EntityKey>,
    },
    /// Unsolicited records. With `want_state` the receiver answers with its
    /// full state.
    Push {
        seq: u64,
        from: String,
        records: Vec<Record>,
        want_state: bool,
    },
}

impl Message {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ping { .. } => "ping",
            Message::Ack { .. } => "ack",
            Message::PingReq { .. } => "ping_req",
            Message::Digest { .. } => "digest",
            Message::Delta { .. } => "delta",
            Message::Push { .. } => "push",
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            Message::Ping { from, .. }
            | Message::Ack { from, .. }
            | Message::PingReq { from, .. }
            | Message::Digest { from, .. }
            | Message::Delta { from, .. }
            | Message::Push { from, .. } => from,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Split items into groups of at most `max_items` whose encoded size stays
/// within one datagram. Always returns at least one (possibly empty) group.
pub fn chunk<T: Serialize>(items: Vec<T>, max_items: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut bytes = 0;

    for item in items {
        let size = serde_json::to_vec(&item).map_or(0, |b| b.len()) + 1;
        if !current.is_empty() && (current.len() >= max_items || bytes + size > CHUNK_BYTES) {
            chunks.push(std::mem::take(&mut current));
            bytes = 0;
        }
        bytes += size;
        current.push(item);
    }
    chunks.push(current);
    chunks
}

/// Split records into groups sized for one message each.
pub fn chunk_records(records: Vec<Record>) -> Vec<Vec<Record>> {
    chunk(records, RECORDS_PER_MESSAGE)
}
