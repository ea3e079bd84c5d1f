//! Gossip status for the admin server, mounted at `/status/gossip`.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;
use std::time::Instant;

use crate::admin::StatusProvider;
use crate::gossip::gossiper::Gossip;
use crate::netmap::NodeStatus;

#[derive(Serialize)]
struct MemberView {
    id: String,
    status: NodeStatus,
    version: u64,
    gossip_addr: String,
    /// Milliseconds since we last heard from the member.
    last_contact_ms: Option<u64>,
}

#[derive(Serialize)]
struct SuspicionView {
    id: String,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct Counters {
    sent: u64,
    received: u64,
    decode_errors: u64,
    send_errors: u64,
    probes: u64,
    probe_failures: u64,
    relayed_probes: u64,
    rejected_records: u64,
}

#[derive(Serialize)]
struct GossipView {
    bind_addr: String,
    advertise_addr: String,
    members: Vec<MemberView>,
    suspicions: Vec<SuspicionView>,
    counters: Counters,
}

impl Gossip {
    fn view(&self) -> GossipView {
        let now = Instant::now();
        let state = self.map.load();
        let local_id = self.map.local_id();

        let members = state
            .nodes()
            .filter(|n| n.id != local_id)
            .map(|n| MemberView {
                id: n.id.clone(),
                status: n.status,
                version: n.version,
                gossip_addr: n.gossip_addr.clone(),
                last_contact_ms: self
                    .contacts
                    .get(&n.id)
                    .and_then(|c| c.last_heard)
                    .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            })
            .collect();

        let suspicions = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .suspicions(now)
            .into_iter()
            .map(|(id, elapsed)| SuspicionView {
                id,
                elapsed_ms: elapsed.as_millis() as u64,
            })
            .collect();

        let transport = self.transport.stats();
        GossipView {
            bind_addr: self.local_addr().to_string(),
            advertise_addr: self.map.local_node().gossip_addr,
            members,
            suspicions,
            counters: Counters {
                sent: transport.sent.load(Ordering::Relaxed),
                received: transport.received.load(Ordering::Relaxed),
                decode_errors: transport.decode_errors.load(Ordering::Relaxed),
                send_errors: transport.send_errors.load(Ordering::Relaxed),
                probes: self.stats.probes.load(Ordering::Relaxed),
                probe_failures: self.stats.probe_failures.load(Ordering::Relaxed),
                relayed_probes: self.stats.relayed.load(Ordering::Relaxed),
                rejected_records: self.stats.rejected_records.load(Ordering::Relaxed),
            },
        }
    }
}

impl StatusProvider for Gossip {
    fn status(&self, path: &str) -> Option<Value> {
        match path {
            "" => serde_json::to_value(self.view()).ok(),
            _ => None,
        }
    }
}
