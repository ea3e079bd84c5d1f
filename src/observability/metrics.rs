//! Metrics collection and exposition.
//!
//! All series go through the `metrics` facade. A Prometheus recorder is
//! installed once per process and the admin server renders its handle at
//! `/metrics`.
//!
//! # Metrics
//! - `netmap_nodes{status}` (gauge), `netmap_endpoints` (gauge)
//! - `netmap_merges_total{outcome}` (counter): `changed` or `unchanged`
//! - `gossip_messages_sent_total{kind}`, `gossip_messages_received_total{kind}`
//! - `gossip_probe_failures_total`, `gossip_decode_errors_total`
//! - `proxy_requests_total{route,status}`, `proxy_request_duration_seconds{route}`
//! - `proxy_upstream_connections` (gauge), `proxy_forward_errors_total{kind}`

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::netmap::NodeStatus;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// A component that owns metric series.
///
/// `register_metrics` describes the component's series so the exporter can
/// emit help text. It is called once at startup.
pub trait MetricsRegisterer: Send + Sync {
    fn register_metrics(&self);
}

/// Install the process-wide Prometheus recorder and return its handle.
///
/// Safe to call more than once; later calls return the first handle. If
/// another recorder was installed first, the returned handle renders nothing.
pub fn install_recorder() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("a metrics recorder was already installed");
            }
            handle
        })
        .clone()
}

/// Render the current metrics in Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.run_upkeep();
    handle.render()
}

pub fn describe_netmap() {
    describe_gauge!("netmap_nodes", "Known cluster members by status");
    describe_gauge!("netmap_endpoints", "Endpoints with at least one registered listener");
    describe_counter!("netmap_merges_total", "Records merged into the network map");
}

pub fn describe_gossip() {
    describe_counter!("gossip_messages_sent_total", "Gossip messages sent by kind");
    describe_counter!("gossip_messages_received_total", "Gossip messages received by kind");
    describe_counter!("gossip_probe_failures_total", "Probes that received no ack");
    describe_counter!("gossip_decode_errors_total", "Gossip datagrams that failed to decode");
}

pub fn describe_proxy() {
    describe_counter!("proxy_requests_total", "Proxied requests by route and status");
    describe_histogram!(
        "proxy_request_duration_seconds",
        metrics::Unit::Seconds,
        "Proxied request latency"
    );
    describe_gauge!("proxy_upstream_connections", "Open local upstream connections");
    describe_counter!("proxy_forward_errors_total", "Failed node-to-node forwards by kind");
}

pub fn set_nodes(status: NodeStatus, count: usize) {
    gauge!("netmap_nodes", "status" => status.to_string()).set(count as f64);
}

pub fn set_endpoints(count: usize) {
    gauge!("netmap_endpoints").set(count as f64);
}

pub fn record_merge(changed: bool) {
    let outcome = if changed { "changed" } else { "unchanged" };
    counter!("netmap_merges_total", "outcome" => outcome).increment(1);
}

pub fn gossip_sent(kind: &'static str) {
    counter!("gossip_messages_sent_total", "kind" => kind).increment(1);
}

pub fn gossip_received(kind: &'static str) {
    counter!("gossip_messages_received_total", "kind" => kind).increment(1);
}

pub fn probe_failed() {
    counter!("gossip_probe_failures_total").increment(1);
}

pub fn decode_error() {
    counter!("gossip_decode_errors_total").increment(1);
}

/// Record a completed proxy request.
///
/// `route` is `local`, `remote` or `none`.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn upstream_connected() {
    gauge!("proxy_upstream_connections").increment(1.0);
}

pub fn upstream_disconnected() {
    gauge!("proxy_upstream_connections").decrement(1.0);
}

pub fn forward_error(kind: &'static str) {
    counter!("proxy_forward_errors_total", "kind" => kind).increment(1);
}
