use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::admin::server::AdminState;
use crate::observability::metrics;

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadyStatus {
    pub ready: bool,
}

pub async fn get_health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

pub async fn get_ready(State(state): State<AdminState>) -> Response {
    let ready = state.readiness.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyStatus { ready })).into_response()
}

pub async fn get_metrics(State(state): State<AdminState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
        .into_response()
}

pub async fn get_status_root(
    State(state): State<AdminState>,
    Path(provider): Path<String>,
) -> Response {
    status(&state, &provider, "")
}

pub async fn get_status(
    State(state): State<AdminState>,
    Path((provider, rest)): Path<(String, String)>,
) -> Response {
    status(&state, &provider, rest.trim_end_matches('/'))
}

fn status(state: &AdminState, provider: &str, path: &str) -> Response {
    match state
        .providers
        .get(provider)
        .and_then(|p| p.status(path))
    {
        Some(value) => Json(value).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown status path").into_response(),
    }
}
