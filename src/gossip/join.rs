//! Seed resolution for joining a cluster.
//!
//! Each join entry is `host[:port]`; the port defaults to the local gossip
//! port. A host may be a DNS name resolving to many nodes, including this
//! one. This node's own addresses are dropped, so a name that resolves only
//! to ourselves means we are the first node.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use crate::net::addr::split_host_port;

/// Outcome of resolving the join list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Candidates {
    /// Peer addresses to contact.
    pub addrs: Vec<SocketAddr>,
    /// Whether any entry resolved at all, including to ourselves.
    pub resolved_any: bool,
}

/// Addresses that reach this node.
#[derive(Debug, Clone, Copy)]
pub struct SelfAddrs {
    pub bound: SocketAddr,
    pub advertised: Option<SocketAddr>,
}

impl SelfAddrs {
    pub fn contains(&self, addr: SocketAddr) -> bool {
        if addr == self.bound || Some(addr) == self.advertised {
            return true;
        }
        if addr.port() != self.bound.port() {
            return false;
        }
        // A wildcard bind also answers on loopback and on the advertised IP.
        self.bound.ip().is_unspecified()
            && (addr.ip().is_loopback() || Some(addr.ip()) == self.advertised.map(|a| a.ip()))
    }
}

/// Resolve every join entry, dropping this node's own addresses and
/// duplicates. Entries that fail to resolve are logged and skipped.
pub async fn resolve_candidates(
    entries: &[String],
    default_port: u16,
    me: SelfAddrs,
) -> Candidates {
    let mut seen = BTreeSet::new();
    let mut candidates = Candidates::default();

    for entry in entries {
        let (host, port) = match split_host_port(entry, default_port) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "skipping join entry");
                continue;
            }
        };
        let addrs = match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "failed to resolve join entry");
                continue;
            }
        };
        for addr in addrs {
            candidates.resolved_any = true;
            if me.contains(addr) {
                tracing::debug!(addr = %addr, "join entry resolves to this node");
                continue;
            }
            if seen.insert(addr) {
                candidates.addrs.push(addr);
            }
        }
    }
    candidates
}
