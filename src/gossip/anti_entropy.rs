//! Digest comparison.
//!
//! The initiator sends its digest in key-ordered chunks. Each chunk declares
//! the key range `(lower, upper]` it covers, so the receiver can tell "the
//! sender lacks this key" apart from "this key is in another chunk".

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::gossip::message::{chunk, DigestEntry, DIGEST_ENTRIES_PER_MESSAGE};
use crate::netmap::{Digest, EntityKey, Stamp};

/// One digest datagram's worth of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChunk {
    pub lower: Option<EntityKey>,
    pub upper: Option<EntityKey>,
    pub entries: Vec<DigestEntry>,
}

/// Split a digest into contiguous chunks covering the whole key space.
pub fn chunk_digest(digest: &Digest) -> Vec<DigestChunk> {
    let entries: Vec<DigestEntry> = digest
        .iter()
        .map(|(key, stamp)| DigestEntry {
            key: key.clone(),
            stamp: *stamp,
        })
        .collect();
    let groups = chunk(entries, DIGEST_ENTRIES_PER_MESSAGE);
    let last = groups.len() - 1;

    let mut lower = None;
    groups
        .into_iter()
        .enumerate()
        .map(|(i, entries)| {
            let upper = if i == last {
                None
            } else {
                entries.last().map(|e| e.key.clone())
            };
            let chunk = DigestChunk {
                lower: lower.take(),
                upper: upper.clone(),
                entries,
            };
            lower = upper;
            chunk
        })
        .collect()
}

fn in_range(key: &EntityKey, lower: Option<&EntityKey>, upper: Option<&EntityKey>) -> bool {
    lower.map_or(true, |l| key > l) && upper.map_or(true, |u| key <= u)
}

/// What to do after comparing a remote digest chunk with the local digest.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Keys the remote lacks or holds older copies of.
    pub send: Vec<EntityKey>,
    /// Keys the remote holds newer copies of.
    pub wants: Vec<EntityKey>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.send.is_empty() && self.wants.is_empty()
    }
}

/// Compare one remote chunk against the local digest, within the chunk's range.
pub fn reconcile(
    local: &Digest,
    lower: Option<&EntityKey>,
    upper: Option<&EntityKey>,
    remote: &[DigestEntry],
) -> Reconciliation {
    let mut result = Reconciliation::default();
    if let (Some(l), Some(u)) = (lower, upper) {
        if l >= u {
            return result;
        }
    }

    let remote: BTreeMap<&EntityKey, Stamp> = remote
        .iter()
        .filter(|e| in_range(&e.key, lower, upper))
        .map(|e| (&e.key, e.stamp))
        .collect();

    let range = (
        lower.map_or(Bound::Unbounded, Bound::Excluded),
        upper.map_or(Bound::Unbounded, Bound::Included),
    );
    for (key, stamp) in local.range::<EntityKey, _>(range) {
        match remote.get(key) {
            Some(theirs) if theirs >= stamp => {}
            _ => result.send.push(key.clone()),
        }
    }

    for (key, theirs) in remote {
        match local.get(key) {
            Some(ours) if ours >= &theirs => {}
            _ => result.wants.push(key.clone()),
        }
    }
    result
}
