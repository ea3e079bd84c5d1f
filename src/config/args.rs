//! Command-line flags.
//!
//! Flag names mirror the config file sections (`--proxy.bind-addr` sets
//! `proxy.bind_addr`). Only flags given on the command line override the file.

use clap::Parser;
use std::path::PathBuf;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "cluster-proxy", version)]
#[command(about = "Clustered reverse proxy for outbound upstream listeners", long_about = None)]
pub struct Args {
    /// TOML config file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long = "proxy.bind-addr")]
    pub proxy_bind_addr: Option<String>,
    #[arg(long = "proxy.advertise-addr")]
    pub proxy_advertise_addr: Option<String>,
    /// Seconds allowed for a forwarded or locally served request.
    #[arg(long = "proxy.gateway-timeout")]
    pub proxy_gateway_timeout: Option<u64>,

    #[arg(long = "admin.bind-addr")]
    pub admin_bind_addr: Option<String>,
    #[arg(long = "admin.advertise-addr")]
    pub admin_advertise_addr: Option<String>,

    #[arg(long = "gossip.bind-addr")]
    pub gossip_bind_addr: Option<String>,
    #[arg(long = "gossip.advertise-addr")]
    pub gossip_advertise_addr: Option<String>,
    /// Anti-entropy interval in milliseconds.
    #[arg(long = "gossip.interval")]
    pub gossip_interval: Option<u64>,

    #[arg(long = "cluster.node-id")]
    pub cluster_node_id: Option<String>,
    /// Seed nodes, comma separated `host[:port]` entries.
    #[arg(long = "cluster.join", value_delimiter = ',')]
    pub cluster_join: Option<Vec<String>>,

    /// Seconds allowed for leaving the cluster and draining each server.
    #[arg(long = "server.graceful-shutdown-timeout")]
    pub graceful_shutdown_timeout: Option<u64>,

    #[arg(long = "log.level")]
    pub log_level: Option<String>,
    /// Subsystems to log at trace, comma separated.
    #[arg(long = "log.subsystems", value_delimiter = ',')]
    pub log_subsystems: Option<Vec<String>>,
}

fn set<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl Args {
    /// Overwrite every config field whose flag was given.
    pub fn apply(&self, config: &mut ServerConfig) {
        set(&mut config.proxy.bind_addr, &self.proxy_bind_addr);
        if self.proxy_advertise_addr.is_some() {
            config.proxy.advertise_addr = self.proxy_advertise_addr.clone();
        }
        set(&mut config.proxy.gateway_timeout_secs, &self.proxy_gateway_timeout);

        set(&mut config.admin.bind_addr, &self.admin_bind_addr);
        if self.admin_advertise_addr.is_some() {
            config.admin.advertise_addr = self.admin_advertise_addr.clone();
        }

        set(&mut config.gossip.bind_addr, &self.gossip_bind_addr);
        if self.gossip_advertise_addr.is_some() {
            config.gossip.advertise_addr = self.gossip_advertise_addr.clone();
        }
        set(&mut config.gossip.interval_ms, &self.gossip_interval);

        if self.cluster_node_id.is_some() {
            config.cluster.node_id = self.cluster_node_id.clone();
        }
        if let Some(join) = &self.cluster_join {
            config.cluster.join = join
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        set(
            &mut config.server.graceful_shutdown_timeout_secs,
            &self.graceful_shutdown_timeout,
        );

        set(&mut config.log.level, &self.log_level);
        set(&mut config.log.subsystems, &self.log_subsystems);
    }
}
