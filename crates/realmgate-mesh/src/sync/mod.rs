//! State synchronizer: push a named value from one realm into another
//! through the shared state-management capability.
//!
//! Authorization happens before the backing store is touched; a denial never
//! reaches it. Backing-store failures are reported, not retried.

use std::sync::Arc;

use uuid::Uuid;

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{
    AbstractionKind, CallerContext, RealmCapability, SyncReceipt, SyncRecord, SyncRequest, SyncStatus,
};
use realmgate_core::Envelope;

use crate::obs::MeshMetrics;
use crate::policy::CapabilityGateway;

pub struct StateSynchronizer {
    gateway: Arc<CapabilityGateway>,
    /// Realm through which Security, Tenant and status reads are fetched.
    realm: String,
    metrics: Arc<MeshMetrics>,
}

impl StateSynchronizer {
    pub fn new(gateway: Arc<CapabilityGateway>, realm: impl Into<String>, metrics: Arc<MeshMetrics>) -> Self {
        Self {
            gateway,
            realm: realm.into(),
            metrics,
        }
    }

    pub async fn sync_state(&self, req: SyncRequest) -> Envelope<SyncReceipt> {
        if let Err(e) = self.authorize(&req).await {
            self.metrics.state_syncs.inc(&[("outcome", "denied")]);
            tracing::warn!(
                key = %req.key,
                source = %req.source_realm,
                target = %req.target_realm,
                error = %e,
                "state sync refused"
            );
            return Envelope::fail_with(failed_receipt(&req.key, None), &e);
        }

        let sync_id = Uuid::new_v4().to_string();
        match self.push(&req, &sync_id).await {
            Ok(status) => {
                self.metrics.state_syncs.inc(&[("outcome", "completed")]);
                tracing::info!(
                    key = %req.key,
                    source = %req.source_realm,
                    target = %req.target_realm,
                    sync_id = %sync_id,
                    "state synced"
                );
                Envelope::ok(SyncReceipt {
                    key: req.key,
                    status,
                    sync_id: Some(sync_id),
                })
            }
            Err(e) => {
                self.metrics.state_syncs.inc(&[("outcome", "failed")]);
                tracing::error!(key = %req.key, sync_id = %sync_id, error = %e, "state sync failed");
                Envelope::fail_with(failed_receipt(&req.key, Some(sync_id)), &e)
            }
        }
    }

    /// Always read from the backing store; nothing is cached here.
    pub async fn get_sync_status(&self, sync_id: &str) -> Envelope<SyncReceipt> {
        let res = async {
            let store = self.gateway.state_store(&self.realm).await?;
            let rec = store
                .sync_status(sync_id)
                .await?
                .ok_or_else(|| MeshError::NotFound(format!("unknown sync_id: {sync_id}")))?;
            Ok::<_, MeshError>(SyncReceipt {
                key: rec.key,
                status: rec.status,
                sync_id: Some(rec.sync_id),
            })
        }
        .await;
        res.into()
    }

    async fn authorize(&self, req: &SyncRequest) -> Result<()> {
        for realm in [&req.source_realm, &req.target_realm] {
            if !self.gateway.knows_realm(realm) {
                return Err(MeshError::PolicyDenied(format!("unknown realm: {realm}")));
            }
        }
        if !self.gateway.realm_has(&req.source_realm, RealmCapability::PublishState) {
            return Err(MeshError::PolicyDenied(format!(
                "realm {} may not publish state",
                req.source_realm
            )));
        }
        if !self.gateway.realm_has(&req.target_realm, RealmCapability::ReceiveState) {
            return Err(MeshError::PolicyDenied(format!(
                "realm {} may not receive state",
                req.target_realm
            )));
        }
        for realm in [&req.source_realm, &req.target_realm] {
            if !self.gateway.validate_access(realm, AbstractionKind::StateManagement) {
                return Err(MeshError::access_denied(realm.as_str(), AbstractionKind::StateManagement.as_str()));
            }
        }

        if let Some(caller) = &req.caller {
            self.check_caller(caller, req).await?;
        }
        Ok(())
    }

    async fn check_caller(&self, caller: &CallerContext, req: &SyncRequest) -> Result<()> {
        let security = self.gateway.security(&self.realm).await?;
        let resource = format!("state:{}:{}", req.target_realm, req.key);
        if !security.check_permissions(caller, &resource, "sync").await? {
            return Err(MeshError::PolicyDenied(format!(
                "user {} may not sync {}",
                caller.user_id, req.key
            )));
        }
        if let Some(tenant_id) = &caller.tenant_id {
            let tenants = self.gateway.tenant(&self.realm).await?;
            if !tenants.validate_tenant_access(tenant_id).await? {
                return Err(MeshError::PolicyDenied(format!("tenant {tenant_id} access denied")));
            }
        }
        Ok(())
    }

    /// One push, no retry. A store that answers without settling the record
    /// is an upstream failure, and the record is settled as `Failed` so later
    /// status reads agree with the receipt. If the store completed it in the
    /// meantime, the sync is reported completed.
    async fn push(&self, req: &SyncRequest, sync_id: &str) -> Result<SyncStatus> {
        let store = self.gateway.state_store(&req.source_realm).await?;
        let status = store.sync_state(SyncRecord::requested(sync_id.to_string(), req)).await?;
        match status {
            SyncStatus::Completed => Ok(status),
            SyncStatus::Failed => Err(MeshError::UpstreamFailure(format!(
                "state store finished sync {sync_id} as failed"
            ))),
            SyncStatus::Requested => {
                tracing::warn!(sync_id = %sync_id, "state store left sync unsettled; marking failed");
                if let Err(e) = store.fail_sync(sync_id).await {
                    let settled = store.sync_status(sync_id).await.ok().flatten().map(|r| r.status);
                    if settled == Some(SyncStatus::Completed) {
                        return Ok(SyncStatus::Completed);
                    }
                    tracing::error!(sync_id = %sync_id, error = %e, "could not settle sync record");
                }
                Err(MeshError::UpstreamFailure(format!(
                    "state store left sync {sync_id} unsettled"
                )))
            }
        }
    }
}

fn failed_receipt(key: &str, sync_id: Option<String>) -> SyncReceipt {
    SyncReceipt {
        key: key.to_string(),
        status: SyncStatus::Failed,
        sync_id,
    }
}
