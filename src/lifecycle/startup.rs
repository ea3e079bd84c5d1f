//! Node startup and the run group that keeps it alive.
//!
//! # Responsibilities
//! - Bind the gossip, proxy and admin listeners (fatal on failure)
//! - Build the network map, gossip, upstream registry and router
//! - Join the cluster, then serve until a signal or a fatal error
//!
//! # Design Decisions
//! - Listeners bind before anything else, so a taken port fails fast
//! - Readiness flips only after a successful join
//! - Shutdown order: leave the cluster, drain the proxy, drain admin, stop gossip

use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::admin::{AdminServer, Readiness};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::gossip::Gossip;
use crate::http::ProxyServer;
use crate::lifecycle::group::RunGroup;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::addr::resolve_advertise_addr;
use crate::net::listener::{bind_tcp, bind_udp};
use crate::netmap::{generate_node_id, NetworkMap, Node};
use crate::observability::metrics::{self, MetricsRegisterer};
use crate::routing::ProxyRouter;
use crate::upstream::UpstreamRegistry;

/// Addresses the listeners actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub proxy: SocketAddr,
    pub admin: SocketAddr,
    pub gossip: SocketAddr,
}

/// A bound, not yet running node.
pub struct Server {
    config: ServerConfig,
    map: Arc<NetworkMap>,
    gossip: Arc<Gossip>,
    router: Arc<ProxyRouter>,
    proxy_listener: TcpListener,
    admin_listener: TcpListener,
    readiness: Readiness,
    metrics: PrometheusHandle,
    addrs: BoundAddrs,
}

fn local_addr(listener: &TcpListener, context: &'static str) -> Result<SocketAddr, Error> {
    listener
        .local_addr()
        .map_err(|source| Error::Io { context, source })
}

impl Server {
    /// Bind every listener and build the subsystems.
    pub async fn bind(config: ServerConfig) -> Result<Self, Error> {
        let gossip_socket = bind_udp("gossip", &config.gossip.bind_addr).await?;
        let proxy_listener = bind_tcp("proxy", &config.proxy.bind_addr).await?;
        let admin_listener = bind_tcp("admin", &config.admin.bind_addr).await?;

        let addrs = BoundAddrs {
            proxy: local_addr(&proxy_listener, "proxy listener address")?,
            admin: local_addr(&admin_listener, "admin listener address")?,
            gossip: gossip_socket
                .local_addr()
                .map_err(|source| Error::Io {
                    context: "gossip socket address",
                    source,
                })?,
        };

        let node = Node::new(
            config
                .cluster
                .node_id
                .clone()
                .unwrap_or_else(generate_node_id),
            resolve_advertise_addr(config.proxy.advertise_addr.as_deref(), addrs.proxy).await?,
            resolve_advertise_addr(config.admin.advertise_addr.as_deref(), addrs.admin).await?,
            resolve_advertise_addr(config.gossip.advertise_addr.as_deref(), addrs.gossip).await?,
        );
        tracing::info!(
            node_id = %node.id,
            proxy = %node.proxy_addr,
            admin = %node.admin_addr,
            gossip = %node.gossip_addr,
            "node identity"
        );

        let map = Arc::new(NetworkMap::new(node));
        let gossip = Arc::new(
            Gossip::new(map.clone(), config.gossip.clone(), gossip_socket).map_err(|source| {
                Error::Io {
                    context: "gossip socket",
                    source,
                }
            })?,
        );
        let registry = Arc::new(UpstreamRegistry::new(map.clone()));
        let router = Arc::new(ProxyRouter::new(map.clone(), registry, &config.proxy));

        let metrics = metrics::install_recorder();
        let registerers: [&dyn MetricsRegisterer; 3] =
            [map.as_ref(), gossip.as_ref(), router.as_ref()];
        for registerer in registerers {
            registerer.register_metrics();
        }

        Ok(Self {
            config,
            map,
            gossip,
            router,
            proxy_listener,
            admin_listener,
            readiness: Readiness::default(),
            metrics,
            addrs,
        })
    }

    pub fn node_id(&self) -> &str {
        self.map.local_id()
    }

    pub fn addrs(&self) -> BoundAddrs {
        self.addrs
    }

    pub fn map(&self) -> &Arc<NetworkMap> {
        &self.map
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Join the cluster and serve until `signal` resolves or an actor fails.
    ///
    /// A failed join is fatal. After the signal the node leaves the cluster
    /// before its servers drain, so peers stop forwarding to it first.
    pub async fn run<S>(self, signal: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let peers = self.gossip.join(&self.config.cluster.join).await?;
        if !peers.is_empty() {
            tracing::info!(peers = ?peers, "joined cluster");
        }

        let Server {
            config,
            map,
            gossip,
            router,
            proxy_listener,
            admin_listener,
            readiness,
            metrics,
            ..
        } = self;
        readiness.set(true);
        tracing::info!(node_id = %map.local_id(), "node ready");

        let graceful_timeout = config.server.graceful_shutdown_timeout();
        let mut group = RunGroup::new();

        {
            let stop = CancellationToken::new();
            let stopped = stop.clone();
            let gossip = gossip.clone();
            let readiness = readiness.clone();
            group.add(
                "signal",
                async move {
                    tokio::select! {
                        _ = signal => {}
                        _ = stopped.cancelled() => return Ok(()),
                    }
                    tracing::info!("shutting down, leaving cluster");
                    readiness.set(false);
                    if let Err(e) = gossip.leave(graceful_timeout).await {
                        tracing::warn!(error = %e, "leave not confirmed, peers will detect the failure");
                    }
                    Ok(())
                },
                move || async move { stop.cancel() },
            );
        }

        {
            let shutdown = Shutdown::new(graceful_timeout);
            let serving = shutdown.clone();
            let server = ProxyServer::new(router.clone());
            let readiness = readiness.clone();
            group.add(
                "proxy",
                async move {
                    let graceful = serving.graceful_token();
                    serving.serve("proxy", server.run(proxy_listener, graceful)).await
                },
                move || async move {
                    readiness.set(false);
                    shutdown.interrupt("proxy").await
                },
            );
        }

        {
            let shutdown = Shutdown::new(graceful_timeout);
            let serving = shutdown.clone();
            let server = AdminServer::new(readiness.clone(), metrics)
                .with_status("netmap", map.clone())
                .with_status("gossip", gossip.clone())
                .with_status("proxy", router.clone());
            group.add(
                "admin",
                async move {
                    let graceful = serving.graceful_token();
                    serving.serve("admin", server.run(admin_listener, graceful)).await
                },
                move || async move { shutdown.interrupt("admin").await },
            );
        }

        {
            let stop = CancellationToken::new();
            let stopped = stop.clone();
            group.add(
                "gossip",
                async move {
                    gossip.run(stopped).await;
                    Ok(())
                },
                move || async move { stop.cancel() },
            );
        }

        let result = group.run().await;
        tracing::info!(node_id = %map.local_id(), "node stopped");
        result
    }
}
