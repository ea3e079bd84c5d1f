//! The process-wide network map.
//!
//! Readers take a snapshot with [`NetworkMap::load`] and never block. Writers
//! are serialized by a mutex, clone the current state, apply their change and
//! publish the new state atomically.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::netmap::node::{EntityKey, Node, NodeStatus, Record, Registration};
use crate::netmap::state::{Digest, NetworkState};
use crate::observability::metrics::{self, MetricsRegisterer};

/// Where requests for an endpoint should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub node_id: String,
    pub proxy_addr: String,
    /// The owner is this node.
    pub local: bool,
}

/// Eventually consistent view of cluster membership and endpoint ownership.
pub struct NetworkMap {
    local_id: String,
    state: ArcSwap<NetworkState>,
    writer: Mutex<()>,
    /// Last version authored by this node. Only touched under `writer`.
    clock: AtomicU64,
    local_changes: watch::Sender<u64>,
}

impl NetworkMap {
    /// Create a map holding only the local node.
    ///
    /// Local versions start at the current Unix time in milliseconds so a
    /// node restarted with the same ID outranks its previous incarnation.
    pub fn new(local: Node) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        Self::with_version(local, seed)
    }

    /// Create a map whose local node starts at the given version.
    pub fn with_version(mut local: Node, version: u64) -> Self {
        local.version = version;
        local.status = NodeStatus::Alive;
        let local_id = local.id.clone();

        let mut state = NetworkState::new();
        state.apply_node(&local);

        let (local_changes, _) = watch::channel(version);
        let map = Self {
            local_id,
            state: ArcSwap::from_pointee(state),
            writer: Mutex::new(()),
            clock: AtomicU64::new(version),
            local_changes,
        };
        map.record_gauges(&map.load());
        map
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<NetworkState> {
        self.state.load_full()
    }

    pub fn local_node(&self) -> Node {
        // The local node is never reaped or removed.
        self.load()
            .node(&self.local_id)
            .cloned()
            .unwrap_or_else(|| Node::new(self.local_id.clone(), "", "", ""))
    }

    /// Notified with the local clock whenever the local node authors a change.
    pub fn subscribe_local(&self) -> watch::Receiver<u64> {
        self.local_changes.subscribe()
    }

    /// Run `f` against a private copy of the state and publish it if `f`
    /// reports a change.
    fn update(&self, f: impl FnOnce(&mut NetworkState) -> bool) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = NetworkState::clone(&self.state.load());
        let changed = f(&mut next);
        if changed {
            self.record_gauges(&next);
            self.state.store(Arc::new(next));
        }
        changed
    }

    /// Next local version. Must be called with the writer lock held.
    fn tick(&self, floor: u64) -> u64 {
        let next = self.clock.load(Ordering::Relaxed).max(floor) + 1;
        self.clock.store(next, Ordering::Relaxed);
        next
    }

    fn local_changed(&self) {
        self.local_changes
            .send_replace(self.clock.load(Ordering::Relaxed));
    }

    /// Merge a record received from a peer. Returns whether the map changed.
    ///
    /// Records about the local node are never adopted. If a peer holds a copy
    /// that outranks ours (for example a suspicion), the local node re-authors
    /// its state with a newer version, which refutes the peer's copy.
    pub fn merge(&self, record: Record) -> bool {
        let changed = match &record {
            Record::Node(node) if node.id == self.local_id => self.refute_node(node),
            Record::Registration(reg) if reg.node_id == self.local_id => {
                self.refute_registration(reg)
            }
            _ => self.update(|state| state.apply(&record)),
        };
        metrics::record_merge(changed);
        changed
    }

    fn refute_node(&self, incoming: &Node) -> bool {
        let refuted = self.update(|state| {
            let Some(local) = state.node(&self.local_id).cloned() else {
                return false;
            };
            if !incoming.supersedes(&local) {
                return false;
            }
            let status = if local.status == NodeStatus::Left {
                NodeStatus::Left
            } else {
                NodeStatus::Alive
            };
            let next = Node {
                version: self.tick(incoming.version.max(local.version)),
                status,
                ..local
            };
            state.apply_node(&next)
        });
        if refuted {
            tracing::info!(
                claimed_status = %incoming.status,
                claimed_version = incoming.version,
                "refuted peer view of local node"
            );
            self.local_changed();
        }
        refuted
    }

    fn refute_registration(&self, incoming: &Registration) -> bool {
        let refuted = self.update(|state| {
            let current = state
                .registration(&incoming.endpoint_id, &self.local_id)
                .cloned();
            if let Some(current) = &current {
                if !incoming.supersedes(current) {
                    return false;
                }
            }
            let floor = current
                .as_ref()
                .map_or(incoming.version, |c| c.version.max(incoming.version));
            let next = Registration {
                node_id: self.local_id.clone(),
                endpoint_id: incoming.endpoint_id.clone(),
                listeners: current.map_or(0, |c| c.listeners),
                version: self.tick(floor),
            };
            state.apply_registration(&next)
        });
        if refuted {
            tracing::debug!(
                endpoint_id = %incoming.endpoint_id,
                "re-asserted local registration"
            );
            self.local_changed();
        }
        refuted
    }

    /// Record one more local listener for the endpoint.
    pub fn add_local_endpoint(&self, endpoint_id: &str) {
        self.update_local_listeners(endpoint_id, |n| n.saturating_add(1));
    }

    /// Record one fewer local listener for the endpoint.
    pub fn remove_local_endpoint(&self, endpoint_id: &str) {
        self.update_local_listeners(endpoint_id, |n| n.saturating_sub(1));
    }

    fn update_local_listeners(&self, endpoint_id: &str, f: impl FnOnce(u32) -> u32) {
        let changed = self.update(|state| {
            let current = state.registration(endpoint_id, &self.local_id);
            let listeners = f(current.map_or(0, |r| r.listeners));
            if current.is_none() && listeners == 0 {
                return false;
            }
            let next = Registration {
                node_id: self.local_id.clone(),
                endpoint_id: endpoint_id.to_string(),
                listeners,
                version: self.tick(current.map_or(0, |r| r.version)),
            };
            state.apply_registration(&next)
        });
        if changed {
            self.local_changed();
        }
    }

    /// Mark the local node as gracefully departed and return its record.
    pub fn leave_local(&self) -> Node {
        let changed = self.update(|state| {
            let Some(local) = state.node(&self.local_id).cloned() else {
                return false;
            };
            if local.status == NodeStatus::Left {
                return false;
            }
            let next = Node {
                version: self.tick(local.version),
                status: NodeStatus::Left,
                ..local
            };
            state.apply_node(&next)
        });
        if changed {
            self.local_changed();
        }
        self.local_node()
    }

    /// Suspect an alive peer. Returns whether its status changed.
    pub fn mark_suspect(&self, node_id: &str) -> bool {
        self.transition(node_id, NodeStatus::Suspect, |s| s == NodeStatus::Alive)
    }

    /// Declare a peer dead. Returns whether its status changed.
    pub fn mark_dead(&self, node_id: &str) -> bool {
        self.transition(node_id, NodeStatus::Dead, |s| {
            matches!(s, NodeStatus::Alive | NodeStatus::Suspect)
        })
    }

    fn transition(
        &self,
        node_id: &str,
        status: NodeStatus,
        allowed: impl Fn(NodeStatus) -> bool,
    ) -> bool {
        if node_id == self.local_id {
            return false;
        }
        let changed = self.update(|state| match state.node(node_id) {
            Some(node) if allowed(node.status) => state.escalate(node_id, status),
            _ => false,
        });
        if changed {
            tracing::info!(node_id = %node_id, status = %status, "node status changed");
        }
        changed
    }

    /// Adopt `alive` for a suspect or dead peer that proved a newer
    /// incarnation.
    pub fn mark_alive(&self, node_id: &str, incarnation: u64) -> bool {
        if node_id == self.local_id {
            return false;
        }
        let changed = self.update(|state| match state.node(node_id) {
            Some(node)
                if matches!(node.status, NodeStatus::Suspect | NodeStatus::Dead)
                    && incarnation > node.version =>
            {
                let next = Node {
                    version: incarnation,
                    status: NodeStatus::Alive,
                    ..node.clone()
                };
                state.apply_node(&next)
            }
            _ => false,
        });
        if changed {
            tracing::info!(node_id = %node_id, incarnation, "node alive again");
        }
        changed
    }

    /// Remove a dead or departed peer and its registrations.
    pub fn reap(&self, node_id: &str) -> bool {
        if node_id == self.local_id {
            return false;
        }
        let reaped = self.update(|state| match state.node(node_id) {
            Some(node) if node.status.is_gone() => state.reap(node_id),
            _ => false,
        });
        if reaped {
            tracing::info!(node_id = %node_id, "reaped node");
        }
        reaped
    }

    /// Stop rejecting stale copies of a reaped node.
    pub fn forget(&self, node_id: &str) -> bool {
        self.update(|state| state.forget(node_id))
    }

    /// Find the node that should serve the endpoint.
    ///
    /// The local node wins when it holds listeners; otherwise a random alive
    /// remote owner is chosen.
    pub fn resolve(&self, endpoint_id: &str) -> Option<Owner> {
        let state = self.load();
        if state.is_owner(endpoint_id, &self.local_id) {
            let local = state.node(&self.local_id)?;
            return Some(Owner {
                node_id: local.id.clone(),
                proxy_addr: local.proxy_addr.clone(),
                local: true,
            });
        }

        let owners: Vec<&Node> = state
            .owners(endpoint_id)
            .filter(|node| node.id != self.local_id)
            .collect();
        if owners.is_empty() {
            return None;
        }
        let node = owners[fastrand::usize(..owners.len())];
        Some(Owner {
            node_id: node.id.clone(),
            proxy_addr: node.proxy_addr.clone(),
            local: false,
        })
    }

    pub fn digest(&self) -> Digest {
        self.load().digest()
    }

    /// Current copies of the given entities; unknown keys are skipped.
    pub fn records(&self, keys: &[EntityKey]) -> Vec<Record> {
        let state = self.load();
        keys.iter().filter_map(|key| state.get(key)).collect()
    }

    /// Every record this node knows.
    pub fn full_state(&self) -> Vec<Record> {
        self.load().records()
    }

    fn record_gauges(&self, state: &NetworkState) {
        for status in [
            NodeStatus::Alive,
            NodeStatus::Suspect,
            NodeStatus::Dead,
            NodeStatus::Left,
        ] {
            metrics::set_nodes(status, state.count_by_status(status));
        }
        metrics::set_endpoints(state.endpoints().count());
    }
}

impl MetricsRegisterer for NetworkMap {
    fn register_metrics(&self) {
        metrics::describe_netmap();
    }
}
