//! Shared helpers for cluster integration tests.

#![allow(dead_code)]

use axum::http::Response;
use bytes::Bytes;
use cluster_proxy::lifecycle::BoundAddrs;
use cluster_proxy::netmap::{NetworkMap, NodeStatus};
use cluster_proxy::upstream::codec::{Frame, ResponseHead};
use cluster_proxy::{Error, Server, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Loopback listeners on ephemeral ports and fast gossip timings.
pub fn config(join: Vec<String>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.proxy.bind_addr = "127.0.0.1:0".into();
    config.proxy.gateway_timeout_secs = 5;
    config.admin.bind_addr = "127.0.0.1:0".into();
    config.gossip.bind_addr = "127.0.0.1:0".into();
    config.gossip.interval_ms = 50;
    config.gossip.probe_interval_ms = 100;
    config.gossip.probe_timeout_ms = 40;
    config.gossip.suspicion_timeout_ms = 500;
    config.gossip.reap_delay_ms = 5_000;
    config.gossip.join_timeout_ms = 1_000;
    config.cluster.join = join;
    config.server.graceful_shutdown_timeout_secs = 5;
    config
}

pub struct TestNode {
    pub id: String,
    pub addrs: BoundAddrs,
    pub map: Arc<NetworkMap>,
    stop: CancellationToken,
    task: JoinHandle<Result<(), Error>>,
}

impl TestNode {
    pub async fn start(join: &[&TestNode]) -> TestNode {
        let seeds = join.iter().map(|n| n.addrs.gossip.to_string()).collect();
        let server = Server::bind(config(seeds)).await.unwrap();
        let id = server.node_id().to_string();
        let addrs = server.addrs();
        let map = server.map().clone();
        let stop = CancellationToken::new();
        let task = tokio::spawn(server.run(stop.clone().cancelled_owned()));
        TestNode {
            id,
            addrs,
            map,
            stop,
            task,
        }
    }

    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.addrs.proxy)
    }

    pub fn admin_url(&self) -> String {
        format!("http://{}", self.addrs.admin)
    }

    /// Leave the cluster and drain, as on SIGTERM.
    pub async fn stop(self) {
        self.stop.cancel();
        self.task.await.unwrap().unwrap();
    }

    /// Stop without leaving, as if the process died.
    pub async fn kill(self) {
        self.task.abort();
        let _ = self.task.await;
    }

    pub fn alive_members(&self) -> usize {
        self.map.load().count_by_status(NodeStatus::Alive)
    }
}

/// Poll `check` until it holds, panicking after `timeout`.
pub async fn eventually<F, Fut>(what: &str, timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// An upstream process: registers `endpoint` and answers every request
/// with `"{name} {method} {uri}"`.
pub struct TestUpstream {
    task: JoinHandle<()>,
}

impl TestUpstream {
    pub async fn connect(node: &TestNode, endpoint: &str, name: &'static str) -> TestUpstream {
        let url = format!("ws://{}/_upstream/v1/{endpoint}", node.addrs.proxy);
        let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (mut sink, mut stream) = socket.split();

        let task = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let Message::Binary(bytes) = message else {
                    continue;
                };
                let Ok(Frame::Request { id, head, .. }) = Frame::decode(bytes) else {
                    continue;
                };
                let response = Response::builder()
                    .header("x-upstream", name)
                    .body(Bytes::from(format!("{name} {} {}", head.method, head.uri)))
                    .unwrap();
                let frame = Frame::Response {
                    id,
                    head: ResponseHead::from_response(&response),
                    body: response.into_body(),
                };
                if sink
                    .send(Message::Binary(frame.encode().unwrap()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        TestUpstream { task }
    }

    pub fn close(self) {
        self.task.abort();
    }
}
