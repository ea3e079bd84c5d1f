//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a node.
//! All types derive Serde traits for deserialization from config files and
//! every field has a default, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a cluster node.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Downstream and upstream-registration listener.
    pub proxy: ProxyConfig,

    /// Health, readiness, metrics and status listener.
    pub admin: AdminConfig,

    /// Membership and failure detection.
    pub gossip: GossipConfig,

    /// Node identity and seeds.
    pub cluster: ClusterConfig,

    /// Process lifecycle.
    pub server: LifecycleConfig,

    pub log: LogConfig,
}

/// Proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bind address (e.g., ":8080" or "10.0.0.4:8080").
    pub bind_addr: String,

    /// Address other nodes forward to. Derived from `bind_addr` when unset.
    pub advertise_addr: Option<String>,

    /// Bound on a node-to-node forward or a local upstream round trip.
    pub gateway_timeout_secs: u64,

    /// Largest request body buffered for a local upstream.
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":8080".to_string(),
            advertise_addr: None,
            gateway_timeout_secs: 15,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Admin listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub bind_addr: String,
    pub advertise_addr: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":8081".to_string(),
            advertise_addr: None,
        }
    }
}

/// Gossip transport and failure detector configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GossipConfig {
    /// UDP bind address.
    pub bind_addr: String,

    pub advertise_addr: Option<String>,

    /// Anti-entropy round interval in milliseconds.
    pub interval_ms: u64,

    /// Peers contacted per anti-entropy round and per push.
    pub fanout: usize,

    /// Failure detector probe interval in milliseconds.
    pub probe_interval_ms: u64,

    /// Time to wait for a direct ack before probing indirectly.
    pub probe_timeout_ms: u64,

    /// Number of peers asked to probe on our behalf.
    pub indirect_probes: usize,

    /// How long a suspect has to refute before it is declared dead.
    pub suspicion_timeout_ms: u64,

    /// How long dead and departed nodes are kept before they are removed.
    pub reap_delay_ms: u64,

    /// Bound on contacting each join candidate.
    pub join_timeout_ms: u64,
}

impl GossipConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn suspicion_timeout(&self) -> Duration {
        Duration::from_millis(self.suspicion_timeout_ms)
    }

    pub fn reap_delay(&self) -> Duration {
        Duration::from_millis(self.reap_delay_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":7000".to_string(),
            advertise_addr: None,
            interval_ms: 500,
            fanout: 3,
            probe_interval_ms: 1000,
            probe_timeout_ms: 500,
            indirect_probes: 3,
            suspicion_timeout_ms: 5000,
            reap_delay_ms: 30_000,
            join_timeout_ms: 5000,
        }
    }
}

/// Cluster identity.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Generated at startup when unset.
    pub node_id: Option<String>,

    /// Seed entries, each `host[:port]`. A host may resolve to many nodes.
    pub join: Vec<String>,
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Bound on leaving the cluster and on draining each server.
    pub graceful_shutdown_timeout_secs: u64,
}

impl LifecycleConfig {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            graceful_shutdown_timeout_secs: 60,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Subsystems logged at trace regardless of `level`.
    pub subsystems: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            subsystems: Vec::new(),
        }
    }
}
