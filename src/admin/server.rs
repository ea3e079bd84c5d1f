//! Admin HTTP server: health, readiness, metrics and status pages.

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::admin::handlers::{get_health, get_metrics, get_ready, get_status, get_status_root};
use crate::admin::status::StatusProvider;

/// Whether the node should receive traffic: set once joined, cleared when
/// shutdown begins.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub readiness: Readiness,
    pub metrics: PrometheusHandle,
    pub providers: Arc<BTreeMap<&'static str, Arc<dyn StatusProvider>>>,
}

pub struct AdminServer {
    state: AdminState,
}

impl AdminServer {
    pub fn new(readiness: Readiness, metrics: PrometheusHandle) -> Self {
        Self {
            state: AdminState {
                readiness,
                metrics,
                providers: Arc::new(BTreeMap::new()),
            },
        }
    }

    /// Mount a status provider at `/status/{name}`.
    pub fn with_status(mut self, name: &'static str, provider: Arc<dyn StatusProvider>) -> Self {
        Arc::make_mut(&mut self.state.providers).insert(name, provider);
        self
    }

    pub fn app(&self) -> Router {
        Router::new()
            .route("/health", get(get_health))
            .route("/ready", get(get_ready))
            .route("/metrics", get(get_metrics))
            .route("/status/{provider}", get(get_status_root))
            .route("/status/{provider}/{*rest}", get(get_status))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` is cancelled and in-flight requests finish.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "admin server starting");
        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        tracing::info!("admin server stopped");
        Ok(())
    }
}
