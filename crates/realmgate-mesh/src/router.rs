//! Axum router wiring for the operational surface.
//!
//! Business traffic does not arrive over HTTP here; services call the
//! `ControlPlane` in-process.

use axum::{routing::get, Router};

use crate::{control_plane::ControlPlane, ops};

pub fn build_router(plane: ControlPlane) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/v1/routes", get(ops::routes))
        .route("/v1/access-metrics", get(ops::access_metrics))
        .with_state(plane)
}
