//! Local upstream connections, grouped by endpoint.
//!
//! # Responsibilities
//! - Track every upstream connection accepted by this node
//! - Pick a connection per request, round robin across the endpoint's pool
//! - Keep the network map's listener counts in step with the pools

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::netmap::NetworkMap;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::upstream::conn::UpstreamConn;

/// Connections for one endpoint and the round-robin cursor over them.
#[derive(Default)]
struct Pool {
    conns: Vec<Arc<dyn UpstreamConn>>,
    counter: AtomicUsize,
}

impl Pool {
    fn next(&self) -> Option<Arc<dyn UpstreamConn>> {
        if self.conns.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        Some(Arc::clone(&self.conns[index]))
    }
}

pub struct UpstreamRegistry {
    map: Arc<NetworkMap>,
    pools: DashMap<String, Pool>,
}

impl UpstreamRegistry {
    pub fn new(map: Arc<NetworkMap>) -> Self {
        Self {
            map,
            pools: DashMap::new(),
        }
    }

    /// Add a connection and announce one more local listener.
    pub fn register(&self, conn: Arc<dyn UpstreamConn>) {
        let endpoint_id = conn.endpoint_id().to_string();
        let conn_id = conn.id();
        self.pools
            .entry(endpoint_id.clone())
            .or_default()
            .conns
            .push(conn);
        self.map.add_local_endpoint(&endpoint_id);
        metrics::upstream_connected();
        tracing::info!(endpoint = %endpoint_id, conn = %conn_id, "upstream registered");
    }

    /// Remove a connection. Returns false if it was not registered, so
    /// callers may unregister more than once.
    pub fn unregister(&self, endpoint_id: &str, conn_id: ConnectionId) -> bool {
        let removed = {
            let Some(mut pool) = self.pools.get_mut(endpoint_id) else {
                return false;
            };
            let before = pool.conns.len();
            pool.conns.retain(|c| c.id() != conn_id);
            before != pool.conns.len()
        };
        if !removed {
            return false;
        }

        self.pools.remove_if(endpoint_id, |_, pool| pool.conns.is_empty());
        self.map.remove_local_endpoint(endpoint_id);
        metrics::upstream_disconnected();
        tracing::info!(endpoint = %endpoint_id, conn = %conn_id, "upstream unregistered");
        true
    }

    /// Next connection for the endpoint.
    pub fn select(&self, endpoint_id: &str) -> Option<Arc<dyn UpstreamConn>> {
        self.pools.get(endpoint_id).and_then(|pool| pool.next())
    }

    pub fn connections(&self, endpoint_id: &str) -> usize {
        self.pools.get(endpoint_id).map_or(0, |pool| pool.conns.len())
    }

    /// Every local endpoint and its connection count, sorted by endpoint.
    pub fn endpoints(&self) -> Vec<(String, usize)> {
        let mut endpoints: Vec<(String, usize)> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.conns.len()))
            .collect();
        endpoints.sort();
        endpoints
    }
}
