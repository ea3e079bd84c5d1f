//! The upstream connection seam and its framed implementation.

use async_trait::async_trait;
use axum::http::{Request, Response};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

use crate::net::connection::{ConnectionId, InFlightTracker};
use crate::upstream::codec::{Frame, RequestHead};
use crate::upstream::UpstreamError;

/// A live connection from an upstream process that serves requests for one
/// endpoint.
#[async_trait]
pub trait UpstreamConn: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn endpoint_id(&self) -> &str;

    /// Send one request and wait for its response.
    async fn round_trip(&self, request: Request<Bytes>) -> Result<Response<Bytes>, UpstreamError>;
}

type Reply = oneshot::Sender<Result<Response<Bytes>, UpstreamError>>;

/// Multiplexes requests over a single frame stream.
///
/// The connection does no I/O itself: encoded request frames go out through
/// an mpsc channel, and the session that owns the socket hands response
/// frames back through [`FramedConn::deliver`].
pub struct FramedConn {
    id: ConnectionId,
    endpoint_id: String,
    next_request: AtomicU64,
    outbound: mpsc::Sender<Bytes>,
    pending: DashMap<u64, Reply>,
    in_flight: InFlightTracker,
    closed: AtomicBool,
}

/// Removes a pending request if its caller gives up.
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, Reply>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl FramedConn {
    /// Create a connection and the receiving end of its outbound frames.
    pub fn new(endpoint_id: impl Into<String>, queue: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(queue);
        let conn = Self {
            id: ConnectionId::new(),
            endpoint_id: endpoint_id.into(),
            next_request: AtomicU64::new(1),
            outbound,
            pending: DashMap::new(),
            in_flight: InFlightTracker::new(),
            closed: AtomicBool::new(false),
        };
        (conn, rx)
    }

    /// Requests sent but not yet answered.
    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    /// Hand a frame received from the upstream to its waiting request.
    ///
    /// A response whose head cannot be converted fails the waiting request
    /// with the codec error.
    pub fn deliver(&self, frame: Frame) -> Result<(), UpstreamError> {
        let Frame::Response { id, head, body } = frame else {
            return Err(UpstreamError::UnexpectedFrame(frame.id()));
        };
        let Some((_, tx)) = self.pending.remove(&id) else {
            // The caller timed out and went away.
            tracing::debug!(conn = %self.id, request = id, "response for unknown request");
            return Ok(());
        };
        let response = head.into_response(body).map_err(|e| {
            tracing::warn!(conn = %self.id, request = id, error = %e, "malformed response from upstream");
            UpstreamError::from(e)
        });
        let _ = tx.send(response);
        Ok(())
    }

    /// Fail every waiting request and refuse new ones. Called when the
    /// session ends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();
    }
}

#[async_trait]
impl UpstreamConn for FramedConn {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn round_trip(&self, request: Request<Bytes>) -> Result<Response<Bytes>, UpstreamError> {
        let _in_flight = self.in_flight.track();
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::Request {
            id,
            head: RequestHead::from_request(&request),
            body: request.into_body(),
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };
        // Checked after inserting: a concurrent close either clears this
        // entry or is seen here.
        if self.closed.load(Ordering::SeqCst) {
            return Err(UpstreamError::Closed);
        }

        self.outbound
            .send(frame)
            .await
            .map_err(|_| UpstreamError::Closed)?;
        rx.await.map_err(|_| UpstreamError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::codec::ResponseHead;

    #[tokio::test]
    async fn pairs_responses_with_requests() {
        let (conn, mut outbound) = FramedConn::new("svc", 8);
        let conn = std::sync::Arc::new(conn);

        let upstream = {
            let conn = conn.clone();
            tokio::spawn(async move {
                while let Some(bytes) = outbound.recv().await {
                    let Frame::Request { id, head, body } = Frame::decode(bytes).unwrap() else {
                        panic!("expected a request frame");
                    };
                    let reply = Frame::Response {
                        id,
                        head: ResponseHead {
                            status: 200,
                            headers: vec![("x-path".into(), head.uri)],
                        },
                        body,
                    };
                    conn.deliver(reply).unwrap();
                }
            })
        };

        let request = Request::builder()
            .uri("/echo")
            .body(Bytes::from_static(b"hello"))
            .unwrap();
        let response = conn.round_trip(request).await.unwrap();
        assert_eq!(response.headers()["x-path"], "/echo");
        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(conn.in_flight().count(), 0);
        upstream.abort();
    }

    #[tokio::test]
    async fn malformed_response_head_fails_the_request() {
        let (conn, mut outbound) = FramedConn::new("svc", 8);
        let conn = std::sync::Arc::new(conn);

        let upstream = {
            let conn = conn.clone();
            tokio::spawn(async move {
                let bytes = outbound.recv().await.unwrap();
                let reply = Frame::Response {
                    id: Frame::decode(bytes).unwrap().id(),
                    head: ResponseHead {
                        status: 200,
                        headers: vec![("bad header".into(), "v".into())],
                    },
                    body: Bytes::new(),
                };
                conn.deliver(reply).unwrap();
            })
        };

        let start = std::time::Instant::now();
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            conn.round_trip(Request::new(Bytes::new())),
        )
        .await
        .expect("request resolved without waiting for a timeout")
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Codec(_)), "{err}");
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        assert!(conn.pending.is_empty());
        upstream.await.unwrap();
    }

    #[tokio::test]
    async fn closed_connection_refuses_new_requests() {
        let (conn, _outbound) = FramedConn::new("svc", 8);
        conn.close();
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            conn.round_trip(Request::new(Bytes::new())),
        )
        .await
        .expect("closed connection answered at once")
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Closed));
        assert!(conn.pending.is_empty());
    }

    #[tokio::test]
    async fn closed_session_fails_requests() {
        let (conn, outbound) = FramedConn::new("svc", 8);
        drop(outbound);
        let err = conn
            .round_trip(Request::new(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Closed));
    }

    #[tokio::test]
    async fn close_fails_waiting_requests() {
        let (conn, _outbound) = FramedConn::new("svc", 8);
        let conn = std::sync::Arc::new(conn);
        let waiting = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.round_trip(Request::new(Bytes::new())).await })
        };
        while conn.in_flight().count() == 0 || conn.pending.is_empty() {
            tokio::task::yield_now().await;
        }
        conn.close();
        assert!(matches!(waiting.await.unwrap(), Err(UpstreamError::Closed)));
    }

    #[test]
    fn rejects_request_frames_from_upstream() {
        let (conn, _outbound) = FramedConn::new("svc", 8);
        let frame = Frame::Request {
            id: 1,
            head: RequestHead {
                method: "GET".into(),
                uri: "/".into(),
                headers: vec![],
            },
            body: Bytes::new(),
        };
        assert!(matches!(
            conn.deliver(frame),
            Err(UpstreamError::UnexpectedFrame(1))
        ));
    }
}
