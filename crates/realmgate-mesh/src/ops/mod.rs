//! Operational HTTP endpoints.
//!
//! - `/healthz`            : liveness
//! - `/readyz`             : readiness (503 when draining)
//! - `/metrics`            : Prometheus text format
//! - `/v1/routes`          : route table snapshot
//! - `/v1/access-metrics`  : per-realm abstraction access tallies

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::control_plane::ControlPlane;

pub async fn healthz(State(plane): State<ControlPlane>) -> Response {
    (StatusCode::OK, Json(plane.health_check())).into_response()
}

pub async fn readyz(State(plane): State<ControlPlane>) -> impl IntoResponse {
    if plane.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(State(plane): State<ControlPlane>) -> Response {
    let body = plane.metrics().render();

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn routes(State(plane): State<ControlPlane>) -> Response {
    Json(plane.list_routes()).into_response()
}

pub async fn access_metrics(State(plane): State<ControlPlane>) -> Response {
    Json(plane.get_access_metrics()).into_response()
}
