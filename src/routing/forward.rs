//! Node-to-node forwarding.
//!
//! A forward is a transparent HTTP hop to the owner's proxy address. The
//! owner sees `x-forwarded-node` and serves from its local upstreams only.
//! Protocol upgrades are tunnelled: once the owner answers `101`, both
//! upgraded connections are joined with `copy_bidirectional`.

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::time::Duration;
use tokio::time::Instant;

use crate::http::request::{is_upgrade, strip_hop_by_hop, X_FORWARDED_NODE};
use crate::netmap::Owner;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid owner address {0:?}")]
    InvalidAddr(String),
    #[error("connect to owner failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),
    #[error("forward failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),
    #[error("owner did not answer within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// The request never reached the owner.
    pub fn is_connect(&self) -> bool {
        matches!(self, ForwardError::Connect(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidAddr(_) => "invalid_addr",
            ForwardError::Connect(_) => "connect",
            ForwardError::Request(_) => "request",
            ForwardError::Timeout(_) => "timeout",
        }
    }
}

pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    local_id: String,
}

impl Forwarder {
    pub fn new(local_id: impl Into<String>, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            timeout,
            local_id: local_id.into(),
        }
    }

    /// Forward the request to `owner`, answering by `deadline`.
    ///
    /// The deadline covers the response head; bodies stream afterwards. A
    /// caller that retries passes the same deadline again, so the gateway
    /// timeout bounds the request as a whole.
    pub async fn forward(
        &self,
        owner: &Owner,
        mut request: Request<Body>,
        deadline: Instant,
    ) -> Result<Response<Body>, ForwardError> {
        let upgrade = is_upgrade(request.headers());
        let downstream = upgrade.then(|| hyper::upgrade::on(&mut request));

        let path = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let uri: Uri = format!("http://{}{}", owner.proxy_addr, path)
            .parse()
            .map_err(|_| ForwardError::InvalidAddr(owner.proxy_addr.clone()))?;
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        strip_hop_by_hop(request.headers_mut(), upgrade);
        if let Ok(node) = HeaderValue::from_str(&self.local_id) {
            request.headers_mut().insert(X_FORWARDED_NODE, node);
        }

        let sent = tokio::time::timeout_at(deadline, self.client.request(request)).await;
        let mut response = match sent {
            Err(_) => return Err(ForwardError::Timeout(self.timeout)),
            Ok(Err(e)) if e.is_connect() => return Err(ForwardError::Connect(e)),
            Ok(Err(e)) => return Err(ForwardError::Request(e)),
            Ok(Ok(response)) => response,
        };

        let switching = response.status() == StatusCode::SWITCHING_PROTOCOLS;
        match downstream {
            Some(downstream) if switching => {
                let upstream = hyper::upgrade::on(&mut response);
                let owner_id = owner.node_id.clone();
                tokio::spawn(async move {
                    let (client, server) = match tokio::try_join!(downstream, upstream) {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::debug!(owner = %owner_id, error = %e, "upgrade failed");
                            return;
                        }
                    };
                    let mut client = TokioIo::new(client);
                    let mut server = TokioIo::new(server);
                    match tokio::io::copy_bidirectional(&mut client, &mut server).await {
                        Ok((sent, received)) => {
                            tracing::debug!(owner = %owner_id, sent, received, "tunnel closed")
                        }
                        Err(e) => tracing::debug!(owner = %owner_id, error = %e, "tunnel failed"),
                    }
                });
            }
            _ => strip_hop_by_hop(response.headers_mut(), false),
        }

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
