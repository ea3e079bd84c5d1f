//! Proxy HTTP server.
//!
//! # Responsibilities
//! - Accept downstream requests and hand them to the router
//! - Accept upstream registrations on `/_upstream/v1/{endpoint_id}`
//! - Set and propagate `x-request-id`
//! - Drain on shutdown: refuse registrations, finish in-flight requests,
//!   close upstream sessions once idle

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Response;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::websocket::register_upstream;
use crate::net::connection::InFlightTracker;
use crate::routing::ProxyRouter;

/// Route upstream processes connect to.
pub const UPSTREAM_PATH: &str = "/_upstream/v1/{endpoint_id}";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub router: Arc<ProxyRouter>,
    /// Cancelled when the server starts draining.
    pub draining: CancellationToken,
    /// Open upstream sessions.
    pub sessions: InFlightTracker,
}

/// HTTP server for downstream requests and upstream registrations.
pub struct ProxyServer {
    router: Arc<ProxyRouter>,
}

impl ProxyServer {
    pub fn new(router: Arc<ProxyRouter>) -> Self {
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    pub fn app(state: ProxyState) -> Router {
        Router::new()
            .route(UPSTREAM_PATH, get(register_upstream))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve until `shutdown` is cancelled, then drain.
    ///
    /// Returns once every downstream connection and upstream session has
    /// finished.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "proxy server starting");

        let state = ProxyState {
            router: self.router,
            draining: shutdown.clone(),
            sessions: InFlightTracker::new(),
        };
        let sessions = state.sessions.clone();

        axum::serve(listener, Self::app(state))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!(sessions = sessions.count(), "proxy listener closed, draining upstream sessions");
        sessions.wait_idle().await;
        tracing::info!("proxy server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<ProxyState>, request: Request) -> Response<Body> {
    state.router.handle(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::netmap::{NetworkMap, Node};
    use crate::upstream::codec::{Frame, ResponseHead};
    use crate::upstream::UpstreamRegistry;
    use axum::http::StatusCode;
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    fn router() -> Arc<ProxyRouter> {
        let map = Arc::new(NetworkMap::with_version(Node::new("local", "p", "a", "g"), 1));
        let registry = Arc::new(UpstreamRegistry::new(map.clone()));
        Arc::new(ProxyRouter::new(map, registry, &ProxyConfig::default()))
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn draining_refuses_registrations() {
        let state = ProxyState {
            router: router(),
            draining: CancellationToken::new(),
            sessions: InFlightTracker::new(),
        };
        state.draining.cancel();

        let request = axum::http::Request::builder()
            .uri("/_upstream/v1/svc")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let response = ProxyServer::app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.sessions.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_requests_finish_after_shutdown_starts() {
        let router = router();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(ProxyServer::new(router.clone()).run(listener, shutdown.clone()));

        let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/_upstream/v1/svc"))
            .await
            .unwrap();
        let (mut sink, mut stream) = socket.split();
        let upstream = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let Message::Binary(bytes) = message else {
                    continue;
                };
                let id = Frame::decode(bytes).unwrap().id();
                tokio::time::sleep(Duration::from_millis(300)).await;
                let reply = Frame::Response {
                    id,
                    head: ResponseHead {
                        status: 200,
                        headers: vec![],
                    },
                    body: Bytes::from_static(b"slow"),
                };
                if sink.send(Message::Binary(reply.encode().unwrap())).await.is_err() {
                    break;
                }
            }
        });
        wait_until(|| router.registry().select("svc").is_some()).await;

        let request = tokio::spawn(async move {
            reqwest::Client::new()
                .get(format!("http://{addr}/"))
                .header("x-endpoint-id", "svc")
                .send()
                .await
                .unwrap()
        });
        wait_until(|| router.in_flight().count() == 1).await;
        shutdown.cancel();

        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "slow");

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(router.registry().select("svc").is_none());
        upstream.abort();
    }
}
