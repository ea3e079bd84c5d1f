//! Failure detector bookkeeping.
//!
//! Probing itself needs the transport and lives in the gossiper. This module
//! holds the parts that only depend on time and the network state: which
//! peer to probe next, and when suspicions, dead nodes and graveyard entries
//! expire.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::netmap::{NetworkState, NodeStatus};

/// Round-robin probe order over a shuffled member list.
///
/// Every member is probed once per pass; a new shuffle starts each pass.
#[derive(Debug, Default)]
pub struct ProbeOrder {
    queue: Vec<String>,
}

impl ProbeOrder {
    /// Next member to probe among `candidates`, skipping any that left the
    /// candidate set since the last shuffle.
    pub fn next(&mut self, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            self.queue.clear();
            return None;
        }
        loop {
            match self.queue.pop() {
                Some(id) if candidates.contains(&id) => return Some(id),
                Some(_) => continue,
                None => {
                    self.queue = candidates.to_vec();
                    fastrand::shuffle(&mut self.queue);
                }
            }
        }
    }
}

/// A timer that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expired {
    /// Suspect that did not refute in time.
    Suspicion(String),
    /// Dead or departed node due for removal.
    Reap(String),
    /// Graveyard entry no longer needed.
    Forget(String),
}

/// Start times of every running timer, keyed by node ID.
#[derive(Debug, Default)]
pub struct Timers {
    suspect_since: HashMap<String, Instant>,
    gone_since: HashMap<String, Instant>,
    buried_since: HashMap<String, Instant>,
}

fn sync_timers<'a>(
    timers: &mut HashMap<String, Instant>,
    ids: impl Iterator<Item = &'a str>,
    now: Instant,
    timeout: Duration,
) -> Vec<String> {
    let mut live = HashMap::with_capacity(timers.len());
    let mut expired = Vec::new();
    for id in ids {
        let since = timers.get(id).copied().unwrap_or(now);
        if now.saturating_duration_since(since) >= timeout {
            expired.push(id.to_string());
        }
        live.insert(id.to_string(), since);
    }
    *timers = live;
    expired
}

impl Timers {
    /// Start timers for newly observed states, drop timers whose state
    /// changed, and return the timers that expired.
    pub fn tick(
        &mut self,
        state: &NetworkState,
        local_id: &str,
        now: Instant,
        suspicion_timeout: Duration,
        reap_delay: Duration,
    ) -> Vec<Expired> {
        let peers: Vec<_> = state.nodes().filter(|n| n.id != local_id).collect();

        let suspects = peers
            .iter()
            .filter(|n| n.status == NodeStatus::Suspect)
            .map(|n| n.id.as_str());
        let gone = peers
            .iter()
            .filter(|n| n.status.is_gone())
            .map(|n| n.id.as_str());
        let buried = state.graveyard().map(|(id, _)| id);

        let mut expired: Vec<Expired> =
            sync_timers(&mut self.suspect_since, suspects, now, suspicion_timeout)
                .into_iter()
                .map(Expired::Suspicion)
                .collect();
        expired.extend(
            sync_timers(&mut self.gone_since, gone, now, reap_delay)
                .into_iter()
                .map(Expired::Reap),
        );
        expired.extend(
            sync_timers(&mut self.buried_since, buried, now, reap_delay)
                .into_iter()
                .map(Expired::Forget),
        );
        expired
    }

    /// Running suspicion timers and their age.
    pub fn suspicions(&self, now: Instant) -> Vec<(String, Duration)> {
        let mut out: Vec<(String, Duration)> = self
            .suspect_since
            .iter()
            .map(|(id, since)| (id.clone(), now.saturating_duration_since(*since)))
            .collect();
        out.sort();
        out
    }
}
