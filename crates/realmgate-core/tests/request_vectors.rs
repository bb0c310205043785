//! Request / sync-request parsing vectors.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use realmgate_core::protocol::{ApiRequest, Method, SyncPriority, SyncRequest, SyncType};

use vector_loader::load;

#[test]
fn parse_request_min() {
    let req: ApiRequest = serde_json::from_str(&load("request_min.json")).unwrap();
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.path, "/api/v1/content");
    assert!(req.caller.is_none());
    assert!(req.request_id.is_none());
    assert!(req.body.is_none());
}

#[test]
fn parse_request_full() {
    let req: ApiRequest = serde_json::from_str(&load("request_full.json")).unwrap();
    assert_eq!(req.method, Method::Post);
    assert_eq!(req.request_id.as_deref(), Some("req-7"));
    assert_eq!(req.source_addr.as_deref(), Some("10.1.2.3"));

    let caller = req.caller.expect("caller present");
    assert_eq!(caller.user_id, "42");
    assert_eq!(caller.tenant_id.as_deref(), Some("acme"));
    assert_eq!(caller.roles, vec!["analyst".to_string()]);
    assert_eq!(req.body.unwrap()["file_id"], "file_123");
}

#[test]
fn reject_unknown_fields_and_methods() {
    assert!(serde_json::from_str::<ApiRequest>(&load("request_unknown_field.json")).is_err());
    assert!(serde_json::from_str::<ApiRequest>(&load("request_bad_method.json")).is_err());
}

#[test]
fn sync_request_defaults() {
    let req: SyncRequest = serde_json::from_str(&load("sync_request.json")).unwrap();
    assert_eq!(req.key, "file_123_status");
    assert_eq!(req.sync_type, SyncType::Full);
    assert_eq!(req.priority, SyncPriority::High);
    assert!(req.caller.is_none());
}
