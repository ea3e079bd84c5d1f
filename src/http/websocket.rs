//! Upstream registration over WebSocket.
//!
//! # Data Flow
//! ```text
//! upstream ──GET /_upstream/v1/{endpoint_id} (upgrade)──▶ register_upstream
//!     → FramedConn registered with the UpstreamRegistry
//!     → session loop:
//!         router request  → FramedConn → outbound queue → binary frame → upstream
//!         upstream frame  → codec decode → FramedConn::deliver → router
//! ```
//!
//! # Design Decisions
//! - One socket task per session; requests are multiplexed by frame ID
//! - Draining unregisters first, then waits for pending requests, then closes
//! - Closing, from either side, unregisters and fails pending requests

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::http::server::ProxyState;
use crate::netmap::is_valid_endpoint_id;
use crate::routing::ProxyError;
use crate::upstream::codec::Frame;
use crate::upstream::{FramedConn, UpstreamConn, UpstreamRegistry};

/// Requests queued for one upstream before senders wait.
const OUTBOUND_QUEUE: usize = 64;

/// Draining and endpoint checks come before the upgrade is inspected.
pub(crate) async fn register_upstream(
    State(state): State<ProxyState>,
    Path(endpoint_id): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.draining.is_cancelled() {
        return ProxyError::Draining.into_response();
    }
    if !is_valid_endpoint_id(&endpoint_id) {
        return ProxyError::InvalidEndpoint(endpoint_id).into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let session = state.sessions.track();
    let registry = Arc::clone(state.router.registry());
    ws.on_upgrade(move |socket| async move {
        let _session = session;
        run_session(socket, endpoint_id, registry, state.draining).await;
    })
}

async fn run_session(
    socket: WebSocket,
    endpoint_id: String,
    registry: Arc<UpstreamRegistry>,
    draining: CancellationToken,
) {
    let (conn, mut outbound) = FramedConn::new(endpoint_id.clone(), OUTBOUND_QUEUE);
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    registry.register(conn.clone());

    let (mut sink, mut stream) = socket.split();
    let mut drained = false;

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Binary(frame)).await {
                    tracing::debug!(conn = %conn_id, error = %e, "upstream write failed");
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    let delivered = Frame::decode(data)
                        .map_err(Into::into)
                        .and_then(|frame| conn.deliver(frame));
                    if let Err(e) = delivered {
                        tracing::warn!(conn = %conn_id, error = %e, "bad frame from upstream");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn = %conn_id, error = %e, "upstream read failed");
                    break;
                }
            },
            _ = draining.cancelled(), if !drained => {
                drained = true;
                registry.unregister(&endpoint_id, conn_id);
                tracing::debug!(conn = %conn_id, in_flight = conn.in_flight().count(), "draining upstream");
            }
            _ = conn.in_flight().wait_idle(), if drained => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    registry.unregister(&endpoint_id, conn_id);
    outbound.close();
    conn.close();
}
