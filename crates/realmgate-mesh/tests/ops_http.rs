#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use axum::body::to_bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use realmgate_mesh::ops;

use common::harness;

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn readiness_flips_when_draining() {
    let h = harness();
    let resp = ops::readyz(State(h.plane.clone())).await.into_response();
    assert_eq!(resp.status(), StatusCode::OK);

    h.plane.set_draining();
    let resp = ops::readyz(State(h.plane.clone())).await.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let health = h.plane.health_check().payload.unwrap();
    assert_eq!(health.status, "draining");
}

#[tokio::test]
async fn metrics_endpoint_renders_prometheus_text() {
    let h = harness();
    h.plane
        .route_api_request(realmgate_core::protocol::ApiRequest::new(
            realmgate_core::protocol::Method::Get,
            "/api/v1/unknown",
        ))
        .await;

    let text = body_text(ops::metrics(State(h.plane.clone())).await).await;
    assert!(text.contains("# TYPE realmgate_route_requests_total counter"));
    assert!(text.contains("kind=\"NOT_FOUND\""));
    assert!(text.contains("realmgate_draining 0"));
}

#[tokio::test]
async fn routes_endpoint_lists_sorted_table() {
    let h = harness();
    let resp = ops::routes(State(h.plane.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["success"], true);
    let routes = v["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 6);
    assert_eq!(routes[0]["path"], "/api/v1/broken");
    assert_eq!(routes[0]["method"], "GET");
}

#[tokio::test]
async fn healthz_reports_gateway_state() {
    let h = harness();
    let resp = ops::healthz(State(h.plane.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["gateway"]["provider_bound"], true);
    assert_eq!(v["routes"], 6);
}

#[tokio::test]
async fn access_metrics_endpoint_is_an_envelope() {
    let h = harness();
    let resp = ops::access_metrics(State(h.plane.clone())).await;
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["success"], true);
    assert!(v["realms"].is_object());
}
