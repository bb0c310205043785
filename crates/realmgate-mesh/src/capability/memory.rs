//! In-process collaborators for single-node deployments and tests.
//!
//! These stand in for the real infrastructure adapters (Redis-style counter
//! store, state-management store, identity service, discovery). Multi-node
//! deployments plug their own implementations in behind the same traits.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use realmgate_core::protocol::{AbstractionKind, CallerContext, ServiceInstance, SyncRecord, SyncStatus};

use super::{
    Abstraction, Admission, CapResult, CapabilityError, CounterStore, InfrastructureProvider, SecurityCapability,
    ServiceDiscovery, StateStore, TenantCapability,
};
use crate::config::InstanceConfig;

/// Per-entry TTL log keyed by string. Expired entries are purged lazily.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, Vec<Instant>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge(deadlines: &mut Vec<Instant>, now: Instant) {
        deadlines.retain(|d| *d >= now);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> CapResult<u64> {
        let now = Instant::now();
        let Some(mut e) = self.entries.get_mut(key) else { return Ok(0); };
        Self::purge(e.value_mut(), now);
        Ok(e.len() as u64)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CapResult<u64> {
        let now = Instant::now();
        let mut e = self.entries.entry(key.to_string()).or_default();
        Self::purge(e.value_mut(), now);
        e.push(now + ttl);
        Ok(e.len() as u64)
    }

    async fn increment_below(&self, key: &str, ttl: Duration, max: u64) -> CapResult<Admission> {
        let now = Instant::now();
        // the entry guard holds the shard lock across purge, compare and push
        let mut e = self.entries.entry(key.to_string()).or_default();
        Self::purge(e.value_mut(), now);
        let live = e.len() as u64;
        if live >= max {
            return Ok(Admission::Refused(live));
        }
        e.push(now + ttl);
        Ok(Admission::Admitted(live + 1))
    }

    async fn delete(&self, key: &str) -> CapResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// State store that keeps every record and refuses status regressions.
#[derive(Default)]
pub struct MemoryStateStore {
    records: DashMap<String, SyncRecord>,
    /// key -> latest payload delivered to each target realm
    state: DashMap<(String, String), serde_json::Value>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value a realm has received for `key`.
    pub fn value_for(&self, realm: &str, key: &str) -> Option<serde_json::Value> {
        self.state
            .get(&(realm.to_string(), key.to_string()))
            .map(|v| v.value().clone())
    }

    /// Force a status change on an existing record (administrative path).
    pub fn mark(&self, sync_id: &str, next: SyncStatus) -> CapResult<SyncStatus> {
        let mut rec = self
            .records
            .get_mut(sync_id)
            .ok_or_else(|| CapabilityError::Rejected(format!("unknown sync_id: {sync_id}")))?;
        rec.advance(next)
            .map_err(|e| CapabilityError::Rejected(e.to_string()))?;
        Ok(rec.status)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn sync_state(&self, mut record: SyncRecord) -> CapResult<SyncStatus> {
        if self.records.contains_key(&record.sync_id) {
            return Err(CapabilityError::Rejected(format!(
                "sync_id already recorded: {}",
                record.sync_id
            )));
        }
        self.state.insert(
            (record.target_realm.clone(), record.key.clone()),
            record.payload.clone(),
        );
        record
            .advance(SyncStatus::Completed)
            .map_err(|e| CapabilityError::Rejected(e.to_string()))?;
        let status = record.status;
        self.records.insert(record.sync_id.clone(), record);
        Ok(status)
    }

    async fn sync_status(&self, sync_id: &str) -> CapResult<Option<SyncRecord>> {
        Ok(self.records.get(sync_id).map(|r| r.value().clone()))
    }

    async fn fail_sync(&self, sync_id: &str) -> CapResult<SyncStatus> {
        self.mark(sync_id, SyncStatus::Failed)
    }
}

/// Grants any authenticated caller (non-empty user id) unless explicitly blocked.
#[derive(Default)]
pub struct AuthenticatedSecurity {
    blocked_users: HashSet<String>,
}

impl AuthenticatedSecurity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_user(mut self, user_id: impl Into<String>) -> Self {
        self.blocked_users.insert(user_id.into());
        self
    }
}

#[async_trait]
impl SecurityCapability for AuthenticatedSecurity {
    async fn check_permissions(&self, caller: &CallerContext, _resource: &str, _action: &str) -> CapResult<bool> {
        Ok(!caller.user_id.is_empty() && !self.blocked_users.contains(&caller.user_id))
    }
}

/// Tenant allow-list. `None` admits every tenant.
#[derive(Default)]
pub struct StaticTenants {
    allowed: Option<HashSet<String>>,
}

impl StaticTenants {
    pub fn any() -> Self {
        Self { allowed: None }
    }

    pub fn only<I, S>(tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(tenants.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl TenantCapability for StaticTenants {
    async fn validate_tenant_access(&self, tenant_id: &str) -> CapResult<bool> {
        Ok(match &self.allowed {
            None => true,
            Some(set) => set.contains(tenant_id),
        })
    }
}

/// Discovery backed by configuration plus runtime (un)registration.
#[derive(Default)]
pub struct StaticDiscovery {
    services: DashMap<String, Vec<ServiceInstance>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(services: &BTreeMap<String, Vec<InstanceConfig>>) -> Self {
        let d = Self::new();
        for (svc, instances) in services {
            for i in instances {
                d.register_instance(ServiceInstance {
                    id: i.id.clone(),
                    service: svc.clone(),
                    address: i.address.clone(),
                    weight: i.weight,
                    healthy: i.healthy,
                });
            }
        }
        d
    }

    /// Add or replace (by id) an instance of `instance.service`.
    pub fn register_instance(&self, instance: ServiceInstance) {
        let mut list = self.services.entry(instance.service.clone()).or_default();
        list.retain(|i| i.id != instance.id);
        tracing::info!(service = %instance.service, instance = %instance.id, "service instance registered");
        list.push(instance);
    }

    pub fn unregister_instance(&self, service: &str, instance_id: &str) -> bool {
        let Some(mut list) = self.services.get_mut(service) else { return false; };
        let before = list.len();
        list.retain(|i| i.id != instance_id);
        let removed = list.len() != before;
        if removed {
            tracing::info!(service = %service, instance = %instance_id, "service instance unregistered");
        }
        removed
    }

    pub fn set_healthy(&self, service: &str, instance_id: &str, healthy: bool) -> bool {
        let Some(mut list) = self.services.get_mut(service) else { return false; };
        match list.iter_mut().find(|i| i.id == instance_id) {
            Some(i) => {
                i.healthy = healthy;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn instances(&self, service: &str) -> CapResult<Vec<ServiceInstance>> {
        Ok(self
            .services
            .get(service)
            .map(|l| l.value().clone())
            .unwrap_or_default())
    }
}

/// Provider holding pre-built abstraction handles keyed by kind.
#[derive(Default)]
pub struct MemoryProvider {
    handles: DashMap<AbstractionKind, Abstraction>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Security, tenant, cache and state-management backed by in-memory stores.
    pub fn standard() -> Self {
        Self::new()
            .with(AbstractionKind::Security, Abstraction::Security(Arc::new(AuthenticatedSecurity::new())))
            .with(AbstractionKind::Tenant, Abstraction::Tenant(Arc::new(StaticTenants::any())))
            .with(AbstractionKind::Cache, Abstraction::Counter(Arc::new(MemoryCounterStore::new())))
            .with(AbstractionKind::StateManagement, Abstraction::State(Arc::new(MemoryStateStore::new())))
    }

    pub fn with(self, kind: AbstractionKind, handle: Abstraction) -> Self {
        self.handles.insert(kind, handle);
        self
    }

    pub fn kinds(&self) -> Vec<AbstractionKind> {
        let mut out: Vec<_> = self.handles.iter().map(|e| *e.key()).collect();
        out.sort();
        out
    }
}

#[async_trait]
impl InfrastructureProvider for MemoryProvider {
    async fn get_abstraction(&self, kind: AbstractionKind) -> CapResult<Abstraction> {
        self.handles
            .get(&kind)
            .map(|h| h.value().clone())
            .ok_or(CapabilityError::Missing(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counter_entries_expire_after_ttl() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(10);
        assert_eq!(store.increment("k", ttl).await, Ok(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.increment("k", ttl).await, Ok(2));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await, Ok(1));
        store.delete("k").await.ok();
        assert_eq!(store.get("k").await, Ok(0));
    }

    #[tokio::test(start_paused = true)]
    async fn capped_increment_refuses_at_max_without_recording() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(10);
        assert_eq!(store.increment_below("k", ttl, 2).await, Ok(Admission::Admitted(1)));
        assert_eq!(store.increment_below("k", ttl, 2).await, Ok(Admission::Admitted(2)));
        assert_eq!(store.increment_below("k", ttl, 2).await, Ok(Admission::Refused(2)));
        assert_eq!(store.get("k").await, Ok(2));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.increment_below("k", ttl, 2).await, Ok(Admission::Admitted(1)));
    }

    #[tokio::test]
    async fn registration_replaces_by_id() {
        let d = StaticDiscovery::new();
        d.register_instance(ServiceInstance::new("svc", "a", "10.0.0.1:80"));
        d.register_instance(ServiceInstance::new("svc", "a", "10.0.0.2:80"));
        let list = d.instances("svc").await.unwrap_or_default();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].address, "10.0.0.2:80");
        assert!(d.unregister_instance("svc", "a"));
        assert!(!d.unregister_instance("svc", "a"));
    }
}
