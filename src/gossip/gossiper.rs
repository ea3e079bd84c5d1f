//! The gossip node: message handling, anti-entropy, failure detection, join
//! and leave.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::GossipConfig;
use crate::gossip::anti_entropy::{chunk_digest, reconcile};
use crate::gossip::detector::{Expired, ProbeOrder, Timers};
use crate::gossip::join::{resolve_candidates, SelfAddrs};
use crate::gossip::message::{
    chunk, chunk_records, Message, DIGEST_ENTRIES_PER_MESSAGE, MAX_DATAGRAM,
};
use crate::gossip::transport::Transport;
use crate::gossip::GossipError;
use crate::netmap::{EntityKey, NetworkMap, NetworkState, Node, NodeStatus, Record};
use crate::observability::metrics::{self, MetricsRegisterer};

/// Who asked us to probe on their behalf.
#[derive(Debug)]
pub(super) struct Relay {
    requester: SocketAddr,
    seq: u64,
    created: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Contact {
    /// Last message received from the node.
    pub(super) last_heard: Option<Instant>,
    /// Last anti-entropy round we started with the node.
    pub(super) last_synced: Option<Instant>,
}

#[derive(Debug, Default)]
pub(super) struct Stats {
    pub(super) probes: AtomicU64,
    pub(super) probe_failures: AtomicU64,
    pub(super) relayed: AtomicU64,
    pub(super) rejected_records: AtomicU64,
}

/// A cluster member's gossip endpoint.
pub struct Gossip {
    pub(super) map: Arc<NetworkMap>,
    pub(super) config: GossipConfig,
    pub(super) transport: Transport,
    seq: AtomicU64,
    /// Acks awaited by probes, joins and leaves, by sequence number.
    pending: DashMap<u64, oneshot::Sender<String>>,
    /// Probes we run for other nodes, by the sequence number we sent.
    pub(super) relays: DashMap<u64, Relay>,
    pub(super) contacts: DashMap<String, Contact>,
    pub(super) timers: Mutex<Timers>,
    pub(super) stats: Stats,
}

/// An outstanding ack. Dropping it stops listening for the ack.
struct AckWaiter<'a> {
    pending: &'a DashMap<u64, oneshot::Sender<String>>,
    seq: u64,
    rx: oneshot::Receiver<String>,
    done: bool,
}

impl AckWaiter<'_> {
    /// Wait for the ack until `deadline`. Returns the acking node's ID.
    async fn wait_until(&mut self, deadline: tokio::time::Instant) -> Option<String> {
        if self.done {
            return None;
        }
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(result) => {
                self.done = true;
                result.ok()
            }
            Err(_) => None,
        }
    }

    async fn wait(&mut self, timeout: Duration) -> Option<String> {
        self.wait_until(tokio::time::Instant::now() + timeout).await
    }
}

impl Drop for AckWaiter<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.seq);
    }
}

/// Parse a gossip address, resolving host names.
async fn resolve_addr(addr: &str) -> Option<SocketAddr> {
    if let Ok(addr) = addr.parse() {
        return Some(addr);
    }
    match tokio::net::lookup_host(addr).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            tracing::debug!(addr = %addr, error = %e, "cannot resolve gossip address");
            None
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl Gossip {
    pub fn new(
        map: Arc<NetworkMap>,
        config: GossipConfig,
        socket: UdpSocket,
    ) -> std::io::Result<Self> {
        Ok(Self {
            map,
            config,
            transport: Transport::new(socket)?,
            seq: AtomicU64::new(1),
            pending: DashMap::new(),
            relays: DashMap::new(),
            contacts: DashMap::new(),
            timers: Mutex::new(Timers::default()),
            stats: Stats::default(),
        })
    }

    /// Address the gossip socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn map(&self) -> &Arc<NetworkMap> {
        &self.map
    }

    fn me(&self) -> String {
        self.map.local_id().to_string()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn expect_ack(&self) -> AckWaiter<'_> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        AckWaiter {
            pending: &self.pending,
            seq,
            rx,
            done: false,
        }
    }

    /// Alive and suspect members other than this node.
    fn live_peers(&self, state: &NetworkState) -> Vec<Node> {
        state
            .nodes()
            .filter(|n| n.id != self.map.local_id())
            .filter(|n| matches!(n.status, NodeStatus::Alive | NodeStatus::Suspect))
            .cloned()
            .collect()
    }

    /// Anti-entropy partners: least recently synced first, ties at random.
    fn sync_targets(&self, state: &NetworkState) -> Vec<Node> {
        let mut peers = self.live_peers(state);
        peers.shuffle(&mut rand::thread_rng());
        peers.sort_by_key(|n| self.contacts.get(&n.id).and_then(|c| c.last_synced));
        peers.truncate(self.config.fanout);
        peers
    }

    fn push_targets(&self, state: &NetworkState) -> Vec<Node> {
        let peers = self.live_peers(state);
        peers
            .choose_multiple(&mut rand::thread_rng(), self.config.fanout)
            .cloned()
            .collect()
    }

    fn indirect_helpers(&self, state: &NetworkState, target: &str) -> Vec<Node> {
        let helpers: Vec<Node> = self
            .live_peers(state)
            .into_iter()
            .filter(|n| n.id != target && n.status == NodeStatus::Alive)
            .collect();
        helpers
            .choose_multiple(&mut rand::thread_rng(), self.config.indirect_probes)
            .cloned()
            .collect()
    }

    async fn send_to_node(&self, node: &Node, msg: &Message) {
        if let Some(addr) = resolve_addr(&node.gossip_addr).await {
            self.transport.send_or_log(addr, msg).await;
        }
    }

    /// Run every gossip loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(addr = %self.local_addr(), "gossip started");
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.receive_loop() => {}
            _ = self.anti_entropy_loop() => {}
            _ = self.probe_loop() => {}
            _ = self.push_loop() => {}
            _ = self.maintenance_loop() => {}
        }
        tracing::info!("gossip stopped");
    }

    async fn receive_loop(&self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match self.transport.recv(&mut buf).await {
                Ok((Some(msg), from)) => self.handle(msg, from).await,
                Ok((None, _)) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "gossip receive failed");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    async fn anti_entropy_loop(&self) {
        let mut ticker = ticker(self.config.interval());
        loop {
            ticker.tick().await;
            self.anti_entropy_round().await;
        }
    }

    async fn probe_loop(&self) {
        let mut ticker = ticker(self.config.probe_interval());
        let mut order = ProbeOrder::default();
        loop {
            ticker.tick().await;
            let state = self.map.load();
            let candidates: Vec<String> =
                self.live_peers(&state).into_iter().map(|n| n.id).collect();
            let Some(target) = order.next(&candidates) else {
                continue;
            };
            if let Some(node) = state.node(&target).cloned() {
                self.probe(node).await;
            }
        }
    }

    async fn push_loop(&self) {
        let mut changes = self.map.subscribe_local();
        loop {
            if changes.changed().await.is_err() {
                // The map outlives us; nothing left to push.
                return std::future::pending().await;
            }
            changes.borrow_and_update();
            self.push_local().await;
        }
    }

    async fn maintenance_loop(&self) {
        let mut ticker = ticker(self.config.probe_interval());
        loop {
            ticker.tick().await;
            self.expire_timers();
        }
    }

    /// Send our digest to the least recently synced peers.
    async fn anti_entropy_round(&self) {
        let state = self.map.load();
        let peers = self.sync_targets(&state);
        if peers.is_empty() {
            return;
        }

        let chunks = chunk_digest(&state.digest());
        let now = Instant::now();
        for peer in peers {
            self.contacts.entry(peer.id.clone()).or_default().last_synced = Some(now);
            let Some(addr) = resolve_addr(&peer.gossip_addr).await else {
                continue;
            };
            for c in &chunks {
                let msg = Message::Digest {
                    from: self.me(),
                    lower: c.lower.clone(),
                    upper: c.upper.clone(),
                    entries: c.entries.clone(),
                };
                self.transport.send_or_log(addr, &msg).await;
            }
        }
    }

    /// Push the local node's records to a few peers.
    async fn push_local(&self) {
        let state = self.map.load();
        let local = self.map.local_id();
        let mut records: Vec<Record> = state.node(local).cloned().map(Record::Node).into_iter().collect();
        records.extend(state.registrations_of(local).cloned().map(Record::Registration));

        let groups = chunk_records(records);
        for peer in self.push_targets(&state) {
            for group in &groups {
                let msg = Message::Push {
                    seq: self.next_seq(),
                    from: self.me(),
                    records: group.clone(),
                    want_state: false,
                };
                self.send_to_node(&peer, &msg).await;
            }
        }
    }

    /// Probe one member: direct ping, then indirect pings, then suspicion.
    async fn probe(&self, target: Node) {
        let Some(addr) = resolve_addr(&target.gossip_addr).await else {
            return;
        };
        self.stats.probes.fetch_add(1, Ordering::Relaxed);

        let start = tokio::time::Instant::now();
        let deadline = start + self.config.probe_interval();
        let mut waiter = self.expect_ack();

        let mut records = vec![Record::Node(self.map.local_node())];
        if target.status != NodeStatus::Alive {
            // Let the target see our doubt so it can refute at once.
            records.push(Record::Node(target.clone()));
        }
        let ping = Message::Ping {
            seq: waiter.seq,
            from: self.me(),
            records,
        };
        self.transport.send_or_log(addr, &ping).await;

        let direct_deadline = deadline.min(start + self.config.probe_timeout());
        if waiter.wait_until(direct_deadline).await.is_some() {
            return;
        }

        let state = self.map.load();
        for helper in self.indirect_helpers(&state, &target.id) {
            let msg = Message::PingReq {
                seq: waiter.seq,
                from: self.me(),
                target: target.id.clone(),
                target_addr: target.gossip_addr.clone(),
            };
            self.send_to_node(&helper, &msg).await;
        }
        if waiter.wait_until(deadline).await.is_some() {
            return;
        }

        self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
        metrics::probe_failed();
        if self.map.mark_suspect(&target.id) {
            tracing::warn!(node_id = %target.id, "probe failed, node suspected");
        }
    }

    /// Fire expired suspicion, reap and graveyard timers.
    fn expire_timers(&self) {
        let state = self.map.load();
        let expired = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick(
                &state,
                self.map.local_id(),
                Instant::now(),
                self.config.suspicion_timeout(),
                self.config.reap_delay(),
            );

        for timer in expired {
            match timer {
                Expired::Suspicion(id) => {
                    if self.map.mark_dead(&id) {
                        tracing::warn!(node_id = %id, "suspicion timed out, node declared dead");
                    }
                }
                Expired::Reap(id) => {
                    self.map.reap(&id);
                }
                Expired::Forget(id) => {
                    self.map.forget(&id);
                }
            }
        }

        let relay_ttl = self.config.probe_interval() * 2;
        self.relays.retain(|_, relay| relay.created.elapsed() < relay_ttl);
        self.contacts.retain(|id, _| state.node(id).is_some());
    }

    /// Validate and merge received records. Returns how many changed the map.
    fn absorb(&self, records: Vec<Record>) -> usize {
        let mut changed = 0;
        for record in records {
            if let Err(e) = record.validate() {
                self.stats.rejected_records.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "rejected gossip record");
                continue;
            }
            if self.map.merge(record) {
                changed += 1;
            }
        }
        changed
    }

    fn heard(&self, from: &str) {
        if from != self.map.local_id() {
            self.contacts.entry(from.to_string()).or_default().last_heard = Some(Instant::now());
        }
    }

    async fn reply_ack(&self, to: SocketAddr, seq: u64) {
        let ack = Message::Ack {
            seq,
            from: self.me(),
            records: vec![Record::Node(self.map.local_node())],
        };
        self.transport.send_or_log(to, &ack).await;
    }

    async fn send_delta(&self, to: SocketAddr, records: Vec<Record>, wants: Vec<EntityKey>) {
        if !records.is_empty() {
            for group in chunk_records(records) {
                let msg = Message::Delta {
                    from: self.me(),
                    records: group,
                    wants: Vec::new(),
                };
                self.transport.send_or_log(to, &msg).await;
            }
        }
        if !wants.is_empty() {
            for group in chunk(wants, DIGEST_ENTRIES_PER_MESSAGE) {
                let msg = Message::Delta {
                    from: self.me(),
                    records: Vec::new(),
                    wants: group,
                };
                self.transport.send_or_log(to, &msg).await;
            }
        }
    }

    async fn handle(&self, msg: Message, src: SocketAddr) {
        self.heard(msg.sender());
        match msg {
            Message::Ping { seq, records, .. } => {
                // Merge first so a refutation is already in the ack.
                self.absorb(records);
                self.reply_ack(src, seq).await;
            }
            Message::Ack { seq, from, records } => {
                if let Some((_, relay)) = self.relays.remove(&seq) {
                    self.stats.relayed.fetch_add(1, Ordering::Relaxed);
                    self.absorb(records.clone());
                    let ack = Message::Ack {
                        seq: relay.seq,
                        from,
                        records,
                    };
                    self.transport.send_or_log(relay.requester, &ack).await;
                    return;
                }

                let incarnation = records.iter().find_map(|r| match r {
                    Record::Node(node) if node.id == from => Some(node.version),
                    _ => None,
                });
                self.absorb(records);
                if let Some(incarnation) = incarnation {
                    self.map.mark_alive(&from, incarnation);
                }
                if let Some((_, tx)) = self.pending.remove(&seq) {
                    let _ = tx.send(from);
                }
            }
            Message::PingReq {
                seq,
                target,
                target_addr,
                ..
            } => {
                let Some(addr) = resolve_addr(&target_addr).await else {
                    return;
                };
                let relay_seq = self.next_seq();
                self.relays.insert(
                    relay_seq,
                    Relay {
                        requester: src,
                        seq,
                        created: Instant::now(),
                    },
                );
                tracing::trace!(target = %target, "probing on behalf of a peer");
                let ping = Message::Ping {
                    seq: relay_seq,
                    from: self.me(),
                    records: vec![Record::Node(self.map.local_node())],
                };
                self.transport.send_or_log(addr, &ping).await;
            }
            Message::Digest {
                lower,
                upper,
                entries,
                ..
            } => {
                let digest = self.map.digest();
                let diff = reconcile(&digest, lower.as_ref(), upper.as_ref(), &entries);
                if diff.is_empty() {
                    return;
                }
                let records = self.map.records(&diff.send);
                self.send_delta(src, records, diff.wants).await;
            }
            Message::Delta { records, wants, .. } => {
                self.absorb(records);
                if !wants.is_empty() {
                    let records = self.map.records(&wants);
                    self.send_delta(src, records, Vec::new()).await;
                }
            }
            Message::Push {
                seq,
                records,
                want_state,
                ..
            } => {
                self.absorb(records);
                if want_state {
                    self.send_delta(src, self.map.full_state(), Vec::new()).await;
                }
                self.reply_ack(src, seq).await;
            }
        }
    }

    /// Join the cluster through the given seed entries.
    ///
    /// Returns the IDs of the nodes that answered. Succeeds with no peers when
    /// there is nothing to join; fails only if every candidate failed.
    pub async fn join(&self, entries: &[String]) -> Result<Vec<String>, GossipError> {
        if entries.is_empty() {
            tracing::info!("no join entries, starting a new cluster");
            return Ok(Vec::new());
        }

        let bound = self.local_addr();
        let me = SelfAddrs {
            bound,
            advertised: self.map.local_node().gossip_addr.parse().ok(),
        };
        let candidates = resolve_candidates(entries, bound.port(), me).await;
        if !candidates.resolved_any {
            return Err(GossipError::Unresolved);
        }
        if candidates.addrs.is_empty() {
            tracing::info!("join entries resolve only to this node, starting a new cluster");
            return Ok(Vec::new());
        }

        let attempts = candidates.addrs.iter().map(|addr| self.contact(*addr));
        let joined: Vec<String> = tokio::select! {
            results = futures_util::future::join_all(attempts) => {
                results.into_iter().flatten().collect()
            }
            _ = self.receive_loop() => Vec::new(),
        };

        if joined.is_empty() {
            return Err(GossipError::Join {
                attempted: candidates.addrs.len(),
            });
        }
        tracing::info!(peers = ?joined, "joined cluster");
        Ok(joined)
    }

    /// Exchange full state with one join candidate.
    async fn contact(&self, addr: SocketAddr) -> Option<String> {
        let mut waiter = self.expect_ack();
        let groups = chunk_records(self.map.full_state());
        let last = groups.len() - 1;

        for (i, group) in groups.into_iter().enumerate() {
            // Only the last push asks for state and is awaited, so the
            // answer covers everything we sent.
            let (seq, want_state) = if i == last {
                (waiter.seq, true)
            } else {
                (self.next_seq(), false)
            };
            let msg = Message::Push {
                seq,
                from: self.me(),
                records: group,
                want_state,
            };
            if let Err(e) = self.transport.send(addr, &msg).await {
                tracing::warn!(addr = %addr, error = %e, "cannot contact join candidate");
                return None;
            }
        }

        let answer = waiter.wait(self.config.join_timeout()).await;
        if answer.is_none() {
            tracing::warn!(addr = %addr, "join candidate did not answer");
        }
        answer
    }

    /// Announce a graceful departure and wait for one peer to acknowledge it.
    pub async fn leave(&self, timeout: Duration) -> Result<(), GossipError> {
        let left = self.map.leave_local();
        let state = self.map.load();
        let peers = self.live_peers(&state);
        if peers.is_empty() {
            tracing::info!("left cluster, no peers to notify");
            return Ok(());
        }

        let mut waiter = self.expect_ack();
        let msg = Message::Push {
            seq: waiter.seq,
            from: self.me(),
            records: vec![Record::Node(left)],
            want_state: false,
        };
        for peer in &peers {
            self.send_to_node(peer, &msg).await;
        }

        let acked = tokio::select! {
            ack = waiter.wait(timeout) => ack,
            _ = self.receive_loop() => None,
        };
        match acked {
            Some(by) => {
                tracing::info!(acked_by = %by, "left cluster");
                Ok(())
            }
            None => Err(GossipError::LeaveTimeout(timeout)),
        }
    }
}

impl MetricsRegisterer for Gossip {
    fn register_metrics(&self) {
        metrics::describe_gossip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netmap::Owner;
    use std::future::Future;
    use tokio::task::JoinHandle;

    struct TestNode {
        gossip: Arc<Gossip>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    impl TestNode {
        fn map(&self) -> &NetworkMap {
            self.gossip.map()
        }

        fn status_of(&self, id: &str) -> Option<NodeStatus> {
            self.map().load().node(id).map(|n| n.status)
        }

        fn start(&mut self) {
            self.shutdown = CancellationToken::new();
            let gossip = Arc::clone(&self.gossip);
            let shutdown = self.shutdown.clone();
            self.task = tokio::spawn(async move { gossip.run(shutdown).await });
        }

        async fn stop(&self) {
            self.shutdown.cancel();
            while !self.task.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    fn config(suspicion_timeout_ms: u64) -> GossipConfig {
        GossipConfig {
            bind_addr: "127.0.0.1:0".into(),
            interval_ms: 50,
            probe_interval_ms: 100,
            probe_timeout_ms: 40,
            suspicion_timeout_ms,
            reap_delay_ms: 60_000,
            join_timeout_ms: 1000,
            ..GossipConfig::default()
        }
    }

    async fn node(id: &str, config: GossipConfig) -> TestNode {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let map = Arc::new(NetworkMap::new(Node::new(
            id,
            format!("127.0.0.1:{}", addr.port() + 1),
            "127.0.0.1:1",
            addr.to_string(),
        )));
        let gossip = Arc::new(Gossip::new(map, config, socket).unwrap());
        let mut node = TestNode {
            gossip,
            shutdown: CancellationToken::new(),
            task: tokio::spawn(async {}),
        };
        node.start();
        node
    }

    async fn eventually<F, Fut>(what: &str, mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn seed(node: &TestNode) -> Vec<String> {
        vec![node.gossip.local_addr().to_string()]
    }

    #[tokio::test]
    async fn three_nodes_converge_on_ownership() {
        let a = node("a", config(5000)).await;
        let b = node("b", config(5000)).await;
        let c = node("c", config(5000)).await;

        assert_eq!(b.gossip.join(&seed(&a)).await.unwrap(), ["a"]);
        assert_eq!(c.gossip.join(&seed(&a)).await.unwrap(), ["a"]);

        b.map().add_local_endpoint("svc-a");

        eventually("c to learn about b", || async {
            c.map().resolve("svc-a")
                == Some(Owner {
                    node_id: "b".into(),
                    proxy_addr: b.map().local_node().proxy_addr,
                    local: false,
                })
        })
        .await;
        eventually("every node to know three members", || async {
            [&a, &b, &c]
                .iter()
                .all(|n| n.map().load().nodes().count() == 3)
        })
        .await;

        b.map().remove_local_endpoint("svc-a");
        eventually("the removal to reach a", || async {
            a.map().resolve("svc-a").is_none()
        })
        .await;
    }

    #[tokio::test]
    async fn silent_node_is_suspected_then_declared_dead() {
        let a = node("a", config(400)).await;
        let b = node("b", config(400)).await;
        b.gossip.join(&seed(&a)).await.unwrap();
        b.map().add_local_endpoint("svc");
        eventually("a to route to b", || async { a.map().resolve("svc").is_some() }).await;

        b.stop().await;

        eventually("a to suspect b", || async {
            a.status_of("b") != Some(NodeStatus::Alive)
        })
        .await;
        assert!(a.map().resolve("svc").is_none());
        eventually("a to declare b dead", || async {
            a.status_of("b") == Some(NodeStatus::Dead)
        })
        .await;
    }

    #[tokio::test]
    async fn suspect_that_answers_again_is_alive() {
        let a = node("a", config(5000)).await;
        let mut b = node("b", config(5000)).await;
        b.gossip.join(&seed(&a)).await.unwrap();

        b.stop().await;
        eventually("a to suspect b", || async {
            a.status_of("b") == Some(NodeStatus::Suspect)
        })
        .await;

        b.start();
        eventually("b to refute", || async {
            a.status_of("b") == Some(NodeStatus::Alive)
        })
        .await;
        assert!(b.map().local_node().status == NodeStatus::Alive);
    }

    #[tokio::test]
    async fn graceful_leave_is_seen_as_left() {
        let a = node("a", config(5000)).await;
        let b = node("b", config(5000)).await;
        b.gossip.join(&seed(&a)).await.unwrap();
        b.map().add_local_endpoint("svc");
        eventually("a to route to b", || async { a.map().resolve("svc").is_some() }).await;

        b.gossip.leave(Duration::from_secs(2)).await.unwrap();

        assert_eq!(a.status_of("b"), Some(NodeStatus::Left));
        assert!(a.map().resolve("svc").is_none());
    }

    #[tokio::test]
    async fn leaving_alone_needs_no_ack() {
        let a = node("a", config(5000)).await;
        a.gossip.leave(Duration::from_millis(100)).await.unwrap();
        assert_eq!(a.map().local_node().status, NodeStatus::Left);
    }

    #[tokio::test]
    async fn join_fails_when_no_candidate_answers() {
        let a = node("a", config(5000)).await;
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let entries = vec![silent.local_addr().unwrap().to_string()];

        let err = a.gossip.join(&entries).await.unwrap_err();
        assert!(matches!(err, GossipError::Join { attempted: 1 }));
        assert!(a.gossip.join(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_survives_partial_failure() {
        let a = node("a", config(5000)).await;
        let b = node("b", config(5000)).await;
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let entries = vec![
            silent.local_addr().unwrap().to_string(),
            a.gossip.local_addr().to_string(),
        ];
        assert_eq!(b.gossip.join(&entries).await.unwrap(), ["a"]);
    }
}
