//! Request routing: serve locally or forward to the owner.

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use dashmap::DashMap;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::Instant as Deadline;

use crate::config::ProxyConfig;
use crate::http::request::{is_upgrade, strip_hop_by_hop, X_ENDPOINT_ID, X_FORWARDED_NODE};
use crate::net::connection::InFlightTracker;
use crate::netmap::NetworkMap;
use crate::observability::metrics::{self, MetricsRegisterer};
use crate::resilience::retries::{should_retry, RetryableRequest};
use crate::routing::error::ProxyError;
use crate::routing::forward::Forwarder;
use crate::routing::matcher;
use crate::upstream::UpstreamRegistry;

/// Where a request went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Unrouted,
    Local,
    Remote,
}

impl Route {
    fn as_str(self) -> &'static str {
        match self {
            Route::Unrouted => "none",
            Route::Local => "local",
            Route::Remote => "remote",
        }
    }
}

pub struct ProxyRouter {
    pub(super) map: Arc<NetworkMap>,
    pub(super) registry: Arc<UpstreamRegistry>,
    forwarder: Forwarder,
    gateway_timeout: Duration,
    max_body_bytes: usize,
    pub(super) in_flight: InFlightTracker,
    /// Requests by outcome: route taken on success, error kind otherwise.
    pub(super) outcomes: DashMap<&'static str, u64>,
}

impl ProxyRouter {
    pub fn new(map: Arc<NetworkMap>, registry: Arc<UpstreamRegistry>, config: &ProxyConfig) -> Self {
        let forwarder = Forwarder::new(map.local_id(), config.gateway_timeout());
        Self {
            map,
            registry,
            forwarder,
            gateway_timeout: config.gateway_timeout(),
            max_body_bytes: config.max_body_bytes,
            in_flight: InFlightTracker::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        &self.registry
    }

    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    pub(crate) fn count(&self, outcome: &'static str) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
    }

    /// Route one downstream request. Failures become error responses.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let _in_flight = self.in_flight.track();
        let mut route = Route::Unrouted;

        let response = match self.route(request, &mut route).await {
            Ok(response) => {
                self.count(route.as_str());
                response
            }
            Err(err) => {
                self.count(err.kind());
                match &err {
                    ProxyError::BadGateway(_) | ProxyError::GatewayTimeout(_) => {
                        tracing::warn!(route = route.as_str(), error = %err, "request failed")
                    }
                    _ => tracing::debug!(route = route.as_str(), error = %err, "request rejected"),
                }
                err.into_response()
            }
        };

        metrics::record_request(route.as_str(), response.status().as_u16(), start);
        response
    }

    async fn route(
        &self,
        mut request: Request<Body>,
        route: &mut Route,
    ) -> Result<Response<Body>, ProxyError> {
        let endpoint = matcher::endpoint_id(&request)?;
        // One budget for the whole request, retry included.
        let deadline = Deadline::now() + self.gateway_timeout;

        if request.headers().contains_key(X_FORWARDED_NODE) {
            // One hop at most: a forwarded request is served here or nowhere.
            *route = Route::Local;
            return self.serve_local(&endpoint, request, deadline).await;
        }

        let owner = self
            .map
            .resolve(&endpoint)
            .ok_or_else(|| ProxyError::NoUpstream(endpoint.clone()))?;
        if owner.local {
            *route = Route::Local;
            return self.serve_local(&endpoint, request, deadline).await;
        }

        *route = Route::Remote;
        if let Ok(value) = HeaderValue::from_str(&endpoint) {
            request.headers_mut().insert(X_ENDPOINT_ID, value);
        }
        let retry = RetryableRequest::capture(&request);

        let err = match self.forwarder.forward(&owner, request, deadline).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                metrics::forward_error(err.kind());
                err
            }
        };

        let (retry, next) = match (retry, self.map.resolve(&endpoint)) {
            (Some(retry), Some(next)) if should_retry(&err, &owner, Some(&next)) => (retry, next),
            _ => return Err(err.into()),
        };

        tracing::info!(
            endpoint = %endpoint,
            failed = %owner.node_id,
            owner = %next.node_id,
            error = %err,
            "retrying with new owner"
        );
        self.count("retried");
        let request = retry.rebuild();
        if next.local {
            *route = Route::Local;
            return self.serve_local(&endpoint, request, deadline).await;
        }
        self.forwarder.forward(&next, request, deadline).await.map_err(|err| {
            metrics::forward_error(err.kind());
            ProxyError::from(err)
        })
    }

    async fn serve_local(
        &self,
        endpoint: &str,
        request: Request<Body>,
        deadline: Deadline,
    ) -> Result<Response<Body>, ProxyError> {
        let conn = self
            .registry
            .select(endpoint)
            .ok_or_else(|| ProxyError::NoUpstream(endpoint.to_string()))?;
        if is_upgrade(request.headers()) {
            return Err(ProxyError::BadGateway(
                "upstream connections do not accept protocol upgrades".into(),
            ));
        }

        let (mut parts, body) = request.into_parts();
        let body = Limited::new(body, self.max_body_bytes)
            .collect()
            .await
            .map_err(|err| {
                if err.downcast_ref::<LengthLimitError>().is_some() {
                    ProxyError::PayloadTooLarge(self.max_body_bytes)
                } else {
                    ProxyError::BodyRead(err.to_string())
                }
            })?
            .to_bytes();
        strip_hop_by_hop(&mut parts.headers, false);

        let response = tokio::time::timeout_at(
            deadline,
            conn.round_trip(Request::from_parts(parts, body)),
        )
        .await
        .map_err(|_| ProxyError::GatewayTimeout(self.gateway_timeout))??;
        Ok(response.map(Body::from))
    }
}

impl MetricsRegisterer for ProxyRouter {
    fn register_metrics(&self) {
        metrics::describe_proxy();
    }
}
