//! Immutable-by-convention cluster state and the pure merge rules.
//!
//! `NetworkState` is a plain value: the network map clones it, applies a
//! change and publishes the result. Applying records is commutative,
//! associative and idempotent, so replicas that saw the same set of records
//! hold equal states regardless of delivery order.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::netmap::node::{EntityKey, Node, NodeStatus, Record, Registration, Stamp};

/// Versions of every known entity.
pub type Digest = BTreeMap<EntityKey, Stamp>;

/// Cluster membership and endpoint ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    nodes: BTreeMap<String, Node>,
    /// endpoint ID -> node ID -> registration.
    registrations: BTreeMap<String, BTreeMap<String, Registration>>,
    /// Reaped node IDs and the last version seen before reaping.
    #[serde(skip)]
    graveyard: BTreeMap<String, u64>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a record. Returns whether the state changed.
    pub fn apply(&mut self, record: &Record) -> bool {
        match record {
            Record::Node(node) => self.apply_node(node),
            Record::Registration(reg) => self.apply_registration(reg),
        }
    }

    pub fn apply_node(&mut self, node: &Node) -> bool {
        if let Some(&buried) = self.graveyard.get(&node.id) {
            if node.version <= buried {
                return false;
            }
            self.graveyard.remove(&node.id);
        }

        match self.nodes.get(&node.id) {
            Some(current) if !node.supersedes(current) => false,
            _ => {
                self.nodes.insert(node.id.clone(), node.clone());
                true
            }
        }
    }

    pub fn apply_registration(&mut self, reg: &Registration) -> bool {
        if self.graveyard.contains_key(&reg.node_id) && !self.nodes.contains_key(&reg.node_id) {
            return false;
        }

        let owners = self.registrations.entry(reg.endpoint_id.clone()).or_default();
        match owners.get(&reg.node_id) {
            Some(current) if !reg.supersedes(current) => false,
            _ => {
                owners.insert(reg.node_id.clone(), reg.clone());
                true
            }
        }
    }

    /// Raise a node's status without changing its version.
    ///
    /// Only transitions the precedence order allows take effect, so a
    /// status can never be lowered this way.
    pub fn escalate(&mut self, node_id: &str, status: NodeStatus) -> bool {
        let Some(current) = self.nodes.get(node_id) else {
            return false;
        };
        let next = current.with_status(status);
        self.apply_node(&next)
    }

    /// Remove a node and its registrations, remembering its last version.
    pub fn reap(&mut self, node_id: &str) -> bool {
        let Some(node) = self.nodes.remove(node_id) else {
            return false;
        };
        self.graveyard.insert(node.id.clone(), node.version);
        self.registrations.retain(|_, owners| {
            owners.remove(node_id);
            !owners.is_empty()
        });
        true
    }

    /// Drop the graveyard entry for a reaped node.
    pub fn forget(&mut self, node_id: &str) -> bool {
        self.graveyard.remove(node_id).is_some()
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn registration(&self, endpoint_id: &str, node_id: &str) -> Option<&Registration> {
        self.registrations.get(endpoint_id)?.get(node_id)
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.values().flat_map(|owners| owners.values())
    }

    /// Registrations owned by one node.
    pub fn registrations_of<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a Registration> + 'a {
        self.registrations
            .values()
            .filter_map(move |owners| owners.get(node_id))
    }

    /// Whether a node currently holds listeners for the endpoint.
    pub fn is_owner(&self, endpoint_id: &str, node_id: &str) -> bool {
        self.registration(endpoint_id, node_id)
            .is_some_and(Registration::is_active)
    }

    /// Nodes that hold listeners for the endpoint and can receive traffic.
    pub fn owners<'a>(&'a self, endpoint_id: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.registrations
            .get(endpoint_id)
            .into_iter()
            .flat_map(|owners| owners.values())
            .filter(|reg| reg.is_active())
            .filter_map(|reg| self.nodes.get(&reg.node_id))
            .filter(|node| node.status.is_routable())
    }

    /// Endpoint IDs with at least one active registration.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.registrations
            .iter()
            .filter(|(_, owners)| owners.values().any(Registration::is_active))
            .map(|(endpoint, _)| endpoint.as_str())
    }

    pub fn is_buried(&self, node_id: &str) -> bool {
        self.graveyard.contains_key(node_id)
    }

    pub fn graveyard(&self) -> impl Iterator<Item = (&str, u64)> {
        self.graveyard.iter().map(|(id, v)| (id.as_str(), *v))
    }

    pub fn get(&self, key: &EntityKey) -> Option<Record> {
        match key {
            EntityKey::Node { id } => self.nodes.get(id).cloned().map(Record::Node),
            EntityKey::Registration {
                node_id,
                endpoint_id,
            } => self
                .registration(endpoint_id, node_id)
                .cloned()
                .map(Record::Registration),
        }
    }

    /// Every record, in key order.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.nodes.values().cloned().map(Record::Node).collect();
        let mut regs: Vec<&Registration> = self.registrations().collect();
        regs.sort_by(|a, b| (&a.node_id, &a.endpoint_id).cmp(&(&b.node_id, &b.endpoint_id)));
        records.extend(regs.into_iter().cloned().map(Record::Registration));
        records
    }

    pub fn digest(&self) -> Digest {
        let nodes = self
            .nodes
            .values()
            .map(|node| (EntityKey::Node { id: node.id.clone() }, node.stamp()));
        let regs = self.registrations().map(|reg| {
            (
                EntityKey::Registration {
                    node_id: reg.node_id.clone(),
                    endpoint_id: reg.endpoint_id.clone(),
                },
                reg.stamp(),
            )
        });
        nodes.chain(regs).collect()
    }

    pub fn count_by_status(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(id: &str, version: u64, status: NodeStatus) -> Node {
        Node {
            version,
            status,
            ..Node::new(
                id,
                format!("{id}.proxy:8080"),
                format!("{id}.admin:8081"),
                format!("{id}.gossip:7000"),
            )
        }
    }

    fn reg(node_id: &str, endpoint: &str, listeners: u32, version: u64) -> Registration {
        Registration {
            node_id: node_id.into(),
            endpoint_id: endpoint.into(),
            listeners,
            version,
        }
    }

    #[test]
    fn last_writer_wins_in_either_order() {
        let v1 = Record::Node(node("a", 1, NodeStatus::Alive));
        let v2 = Record::Node(node("a", 2, NodeStatus::Alive));

        let mut forward = NetworkState::new();
        assert!(forward.apply(&v1));
        assert!(forward.apply(&v2));

        let mut backward = NetworkState::new();
        assert!(backward.apply(&v2));
        assert!(!backward.apply(&v1));

        assert_eq!(forward, backward);
        assert_eq!(forward.node("a").unwrap().version, 2);
    }

    #[test]
    fn equal_versions_pick_the_same_winner() {
        let alive = Record::Node(node("a", 5, NodeStatus::Alive));
        let suspect = Record::Node(node("a", 5, NodeStatus::Suspect));

        let mut x = NetworkState::new();
        x.apply(&alive);
        x.apply(&suspect);
        let mut y = NetworkState::new();
        y.apply(&suspect);
        y.apply(&alive);

        assert_eq!(x, y);
        assert_eq!(x.node("a").unwrap().status, NodeStatus::Suspect);
    }

    #[test]
    fn duplicate_apply_is_a_no_op() {
        let record = Record::Registration(reg("a", "svc", 1, 3));
        let mut state = NetworkState::new();
        assert!(state.apply(&record));
        assert!(!state.apply(&record));
    }

    #[test]
    fn owners_require_alive_node_and_active_registration() {
        let mut state = NetworkState::new();
        state.apply_node(&node("a", 1, NodeStatus::Alive));
        state.apply_node(&node("b", 1, NodeStatus::Alive));
        state.apply_registration(&reg("a", "svc", 1, 1));
        state.apply_registration(&reg("b", "svc", 0, 2));

        let owners: Vec<&str> = state.owners("svc").map(|n| n.id.as_str()).collect();
        assert_eq!(owners, vec!["a"]);

        state.escalate("a", NodeStatus::Suspect);
        assert_eq!(state.owners("svc").count(), 0);
        assert!(state.is_owner("svc", "a"));
    }

    #[test]
    fn registration_without_node_record_is_kept_but_unresolved() {
        let mut state = NetworkState::new();
        state.apply_registration(&reg("ghost", "svc", 1, 1));
        assert_eq!(state.owners("svc").count(), 0);

        state.apply_node(&node("ghost", 1, NodeStatus::Alive));
        assert_eq!(state.owners("svc").count(), 1);
    }

    #[test]
    fn escalate_never_lowers_status() {
        let mut state = NetworkState::new();
        state.apply_node(&node("a", 1, NodeStatus::Dead));
        assert!(!state.escalate("a", NodeStatus::Suspect));
        assert!(!state.escalate("a", NodeStatus::Alive));
        assert!(state.escalate("a", NodeStatus::Left));
    }

    #[test]
    fn reaped_nodes_stay_buried_until_a_newer_version() {
        let mut state = NetworkState::new();
        state.apply_node(&node("a", 4, NodeStatus::Dead));
        state.apply_registration(&reg("a", "svc", 1, 9));
        assert!(state.reap("a"));
        assert!(state.node("a").is_none());
        assert_eq!(state.endpoints().count(), 0);

        assert!(!state.apply_node(&node("a", 4, NodeStatus::Alive)));
        assert!(!state.apply_registration(&reg("a", "svc", 1, 9)));

        assert!(state.apply_node(&node("a", 5, NodeStatus::Alive)));
        assert!(!state.is_buried("a"));
    }

    #[test]
    fn forget_clears_the_graveyard() {
        let mut state = NetworkState::new();
        state.apply_node(&node("a", 4, NodeStatus::Left));
        state.reap("a");
        assert!(state.forget("a"));
        assert!(state.apply_node(&node("a", 1, NodeStatus::Alive)));
    }

    #[test]
    fn digest_and_get_cover_every_entity() {
        let mut state = NetworkState::new();
        state.apply_node(&node("a", 2, NodeStatus::Suspect));
        state.apply_registration(&reg("a", "svc", 1, 7));

        let digest = state.digest();
        assert_eq!(digest.len(), 2);
        for (key, stamp) in &digest {
            let record = state.get(key).unwrap();
            assert_eq!(record.stamp(), *stamp);
        }
        assert_eq!(
            digest[&EntityKey::Node { id: "a".into() }],
            Stamp {
                version: 2,
                rank: 1
            }
        );
        assert_eq!(state.records().len(), 2);
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        let ids = prop::sample::select(vec!["a", "b", "c"]);
        let endpoints = prop::sample::select(vec!["svc-a", "svc-b"]);
        let statuses = prop::sample::select(vec![
            NodeStatus::Alive,
            NodeStatus::Suspect,
            NodeStatus::Dead,
            NodeStatus::Left,
        ]);
        prop_oneof![
            (ids.clone(), 0u64..4, statuses)
                .prop_map(|(id, v, s)| Record::Node(node(id, v, s))),
            (ids, endpoints, 0u32..3, 0u64..4)
                .prop_map(|(id, ep, l, v)| Record::Registration(reg(id, ep, l, v))),
        ]
    }

    proptest! {
        /// Replicas converge for any order and duplication of deliveries.
        #[test]
        fn merge_converges(
            records in prop::collection::vec(arb_record(), 1..40),
            seeds in prop::collection::vec(any::<u64>(), 3),
        ) {
            let mut replicas = Vec::new();
            for seed in seeds {
                let mut order: Vec<Record> = records.clone();
                // Duplicate a prefix, then shuffle deterministically.
                let dup = (seed as usize) % order.len();
                order.extend(records[..dup].iter().cloned());
                fastrand::Rng::with_seed(seed).shuffle(&mut order);

                let mut state = NetworkState::new();
                for record in &order {
                    state.apply(record);
                }
                replicas.push(state);
            }
            prop_assert_eq!(&replicas[0], &replicas[1]);
            prop_assert_eq!(&replicas[1], &replicas[2]);
        }

        /// Applying another replica's records makes the digests equal.
        #[test]
        fn exchanging_full_state_converges(
            left in prop::collection::vec(arb_record(), 0..20),
            right in prop::collection::vec(arb_record(), 0..20),
        ) {
            let mut a = NetworkState::new();
            for r in &left { a.apply(r); }
            let mut b = NetworkState::new();
            for r in &right { b.apply(r); }

            for r in b.records() { a.apply(&r); }
            for r in a.records() { b.apply(&r); }
            prop_assert_eq!(a.digest(), b.digest());
            prop_assert_eq!(a, b);
        }
    }
}
