#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use realmgate_core::error::{ErrorKind, MeshError};
use realmgate_core::protocol::AbstractionKind;
use realmgate_mesh::capability::memory::{MemoryCounterStore, MemoryProvider};
use realmgate_mesh::capability::{Abstraction, InfrastructureProvider};
use realmgate_mesh::obs::MeshMetrics;
use realmgate_mesh::policy::{AccessRecord, CapabilityGateway, RealmMap};
use realmgate_mesh::ControlPlane;

use common::{harness, mesh_config, FailingProvider};

fn gateway_with(provider: Arc<dyn InfrastructureProvider>) -> (CapabilityGateway, Arc<MeshMetrics>) {
    let cfg = mesh_config();
    let metrics = Arc::new(MeshMetrics::default());
    let realms = RealmMap::compile(&cfg.realms).unwrap();
    let gw = CapabilityGateway::initialize(realms, Some(provider), Arc::clone(&metrics)).unwrap();
    (gw, metrics)
}

#[test]
fn validate_access_matches_allow_list_exactly() {
    let cfg = mesh_config();
    let (gw, _) = gateway_with(Arc::new(MemoryProvider::standard()));

    for realm in cfg.realms.iter().map(|r| r.id.as_str()).chain(["nowhere"]) {
        let listed: Vec<String> = cfg
            .realms
            .iter()
            .find(|r| r.id == realm)
            .map(|r| r.abstractions.clone())
            .unwrap_or_default();
        for kind in AbstractionKind::ALL {
            let expected = listed.iter().any(|n| n == kind.as_str());
            assert_eq!(gw.validate_access(realm, kind), expected, "{realm}/{kind}");
            assert_eq!(gw.validate_access_name(realm, kind.as_str()), expected, "{realm}/{kind}");
        }
        assert!(!gw.validate_access_name(realm, "warp_drive"));
        assert!(!gw.validate_access_name(realm, ""));
    }
}

#[tokio::test]
async fn denied_fetch_counts_only_as_denial() {
    let (gw, metrics) = gateway_with(Arc::new(MemoryProvider::standard()));

    let err = gw
        .get_abstraction("business_enablement", AbstractionKind::Session)
        .await
        .expect_err("session is not allow-listed for business_enablement");

    assert_eq!(err, MeshError::access_denied("business_enablement", "session"));
    assert_eq!(err.kind(), ErrorKind::PolicyDenied);
    let msg = err.to_string();
    assert!(msg.contains("business_enablement") && msg.contains("session"));

    assert_eq!(
        gw.access_record("business_enablement", AbstractionKind::Session),
        AccessRecord {
            attempts: 1,
            successes: 0,
            denials: 1,
            failures: 0
        }
    );
    assert_eq!(metrics.abstraction_access.get(&session_labels("denied")), 1);
    assert_eq!(metrics.abstraction_access.get(&session_labels("success")), 0);
}

fn session_labels(outcome: &'static str) -> [(&'static str, &'static str); 3] {
    [
        ("realm", "business_enablement"),
        ("abstraction", "session"),
        ("outcome", outcome),
    ]
}

#[tokio::test]
async fn allowed_fetch_counts_success() {
    let (gw, _) = gateway_with(Arc::new(MemoryProvider::standard()));

    let handle = gw.get_abstraction("smart_city", AbstractionKind::Cache).await.unwrap();
    assert!(matches!(handle, Abstraction::Counter(_)));
    gw.counter_store("smart_city").await.unwrap();

    let rec = gw.access_record("smart_city", AbstractionKind::Cache);
    assert_eq!((rec.attempts, rec.successes, rec.denials), (2, 2, 0));
}

#[tokio::test]
async fn provider_failure_is_tracked_apart_from_denials() {
    let (gw, metrics) = gateway_with(Arc::new(FailingProvider));

    let err = gw.get_abstraction("smart_city", AbstractionKind::Security).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    let rec = gw.access_record("smart_city", AbstractionKind::Security);
    assert_eq!((rec.failures, rec.denials, rec.successes), (1, 0, 0));
    assert_eq!(metrics.abstraction_access.sum_matching(&[("outcome", "failure")]), 1);
    assert_eq!(gw.health_check().total_failures, 1);
}

#[tokio::test]
async fn missing_kind_in_provider_is_unavailable() {
    let (gw, _) = gateway_with(Arc::new(MemoryProvider::new()));
    let err = gw.get_abstraction("smart_city", AbstractionKind::Session).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn wrong_handle_type_is_internal() {
    let provider = MemoryProvider::new().with(
        AbstractionKind::Security,
        Abstraction::Counter(Arc::new(MemoryCounterStore::new())),
    );
    let (gw, metrics) = gateway_with(Arc::new(provider));
    let err = gw.security("smart_city").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Internal);

    // a handle the caller cannot use is a failed fetch, never a success
    let rec = gw.access_record("smart_city", AbstractionKind::Security);
    assert_eq!((rec.attempts, rec.successes, rec.failures), (1, 0, 1));
    assert_eq!(metrics.abstraction_access.sum_matching(&[("outcome", "success")]), 0);
    assert_eq!(metrics.abstraction_access.sum_matching(&[("outcome", "failure")]), 1);
}

#[test]
fn initialize_requires_a_provider() {
    let cfg = mesh_config();
    let realms = RealmMap::compile(&cfg.realms).unwrap();
    let res = CapabilityGateway::initialize(realms, None, Arc::new(MeshMetrics::default()));
    assert!(matches!(res, Err(MeshError::Config(_))));

    assert!(ControlPlane::builder(mesh_config()).build().is_err());
}

#[test]
fn realm_abstractions_come_from_static_list() {
    let (gw, _) = gateway_with(Arc::new(MemoryProvider::standard()));
    let mut got = gw.get_realm_abstractions("content");
    got.sort();
    assert_eq!(got, vec![AbstractionKind::FileManagement, AbstractionKind::StateManagement]);
    assert!(gw.get_realm_abstractions("nowhere").is_empty());
}

#[tokio::test]
async fn control_plane_reports_access_metrics() {
    let h = harness();
    let gw = h.plane.gateway();
    let _ = gw.get_abstraction("experience", AbstractionKind::Llm).await;
    let _ = gw.get_abstraction("experience", AbstractionKind::Session).await;

    let env = h.plane.get_access_metrics();
    assert!(env.success);
    let realms = env.payload.unwrap().realms;
    assert_eq!(realms["experience"]["llm"].denials, 1);
    assert_eq!(realms["experience"]["session"].failures, 1);

    let check = h.plane.validate_realm_access("experience", "session");
    assert!(check.success && check.payload.as_ref().unwrap().allowed);
    let check = h.plane.validate_realm_access("experience", "llm");
    assert!(!check.payload.unwrap().allowed);

    let health = h.plane.health_check().payload.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.gateway.realms, 5);
    assert_eq!(health.gateway.total_denials, 1);
}
