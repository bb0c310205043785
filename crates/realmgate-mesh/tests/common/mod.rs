#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{AbstractionKind, ApiRequest, CallerContext, ServiceInstance, SyncRecord, SyncStatus};
use realmgate_mesh::capability::memory::{MemoryCounterStore, MemoryProvider, MemoryStateStore, StaticDiscovery, StaticTenants};
use realmgate_mesh::capability::{
    Abstraction, Admission, CapResult, CapabilityError, CounterStore, InfrastructureProvider, SecurityCapability,
    ServiceDiscovery, StateStore,
};
use realmgate_mesh::config::{self, MeshConfig};
use realmgate_mesh::dispatch::ServiceHandler;
use realmgate_mesh::obs::{CompletionEvent, RouteState, TelemetrySink};
use realmgate_mesh::ControlPlane;

pub const MESH_YAML: &str = r#"
version: 1
realms:
  - id: smart_city
    abstractions: [security, tenant, cache, state_management, session]
  - id: business_enablement
    abstractions: [file_management, llm, cache]
    capabilities: [route_requests]
  - id: content
    abstractions: [file_management, state_management]
  - id: insights
    abstractions: [llm, state_management]
  - id: experience
    abstractions: [session]
rate_limit:
  window_secs: 60
  max_requests: 3
  classes:
    uploads: { window_secs: 10, max_requests: 1 }
routes:
  - { path: "/api/v1/files", method: GET, service: content }
  - { path: "/api/v1/files", method: POST, service: content, rate_class: uploads }
  - { path: "/api/v1/broken", method: GET, service: content, handler: missing }
  - { path: "/api/v1/panic", method: GET, service: content, handler: panicky }
  - { path: "/api/v1/failing", method: GET, service: content, handler: failing }
  - { path: "/api/v1/orphan", method: GET, service: ghost }
services:
  content:
    - { id: content-1, address: "10.0.1.10:9000" }
    - { id: content-2, address: "10.0.1.11:9000" }
"#;

pub fn mesh_config() -> MeshConfig {
    config::load_from_str(MESH_YAML).expect("test config must parse")
}

/// Counter store that counts calls and can simulate an outage.
#[derive(Default)]
pub struct CountingCounterStore {
    inner: MemoryCounterStore,
    pub calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingCounterStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Live entry count without touching the call counter.
    pub async fn peek(&self, key: &str) -> u64 {
        self.inner.get(key).await.unwrap()
    }

    fn enter(&self) -> CapResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapabilityError::Unreachable("counter store down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for CountingCounterStore {
    async fn get(&self, key: &str) -> CapResult<u64> {
        self.enter()?;
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> CapResult<u64> {
        self.enter()?;
        self.inner.increment(key, ttl).await
    }

    async fn increment_below(&self, key: &str, ttl: Duration, max: u64) -> CapResult<Admission> {
        self.enter()?;
        // a round trip: lets concurrent callers interleave before the store step
        tokio::task::yield_now().await;
        self.inner.increment_below(key, ttl, max).await
    }

    async fn delete(&self, key: &str) -> CapResult<()> {
        self.enter()?;
        self.inner.delete(key).await
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Normal,
    Unreachable,
    Rejecting,
    /// Accept the record but answer before applying it.
    Deferring,
}

/// State store wrapper that counts writes and can fail on demand.
pub struct CountingStateStore {
    pub inner: MemoryStateStore,
    writes: AtomicUsize,
    mode: Mutex<StoreMode>,
    deferred: Mutex<HashMap<String, SyncRecord>>,
}

impl Default for CountingStateStore {
    fn default() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            writes: AtomicUsize::new(0),
            mode: Mutex::new(StoreMode::Normal),
            deferred: Mutex::new(HashMap::new()),
        }
    }
}

impl CountingStateStore {
    pub fn set_mode(&self, mode: StoreMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn sync_state(&self, record: SyncRecord) -> CapResult<SyncStatus> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            StoreMode::Normal => self.inner.sync_state(record).await,
            StoreMode::Unreachable => Err(CapabilityError::Unreachable("state store down".into())),
            StoreMode::Rejecting => Err(CapabilityError::Rejected("payload too large".into())),
            StoreMode::Deferring => {
                self.deferred.lock().unwrap().insert(record.sync_id.clone(), record);
                Ok(SyncStatus::Requested)
            }
        }
    }

    async fn sync_status(&self, sync_id: &str) -> CapResult<Option<SyncRecord>> {
        if let Some(rec) = self.deferred.lock().unwrap().get(sync_id) {
            return Ok(Some(rec.clone()));
        }
        self.inner.sync_status(sync_id).await
    }

    async fn fail_sync(&self, sync_id: &str) -> CapResult<SyncStatus> {
        if let Some(rec) = self.deferred.lock().unwrap().get_mut(sync_id) {
            rec.advance(SyncStatus::Failed)
                .map_err(|e| CapabilityError::Rejected(e.to_string()))?;
            return Ok(rec.status);
        }
        self.inner.fail_sync(sync_id).await
    }
}

/// Security double: grants everyone except blocked users, counting checks.
#[derive(Default)]
pub struct CountingSecurity {
    blocked: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl CountingSecurity {
    pub fn block(&self, user: &str) {
        self.blocked.lock().unwrap().insert(user.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecurityCapability for CountingSecurity {
    async fn check_permissions(&self, caller: &CallerContext, _resource: &str, _action: &str) -> CapResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.blocked.lock().unwrap().contains(&caller.user_id))
    }
}

/// Discovery wrapper counting every lookup.
pub struct CountingDiscovery {
    pub inner: StaticDiscovery,
    calls: AtomicUsize,
}

impl CountingDiscovery {
    pub fn new(inner: StaticDiscovery) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceDiscovery for CountingDiscovery {
    async fn instances(&self, service: &str) -> CapResult<Vec<ServiceInstance>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.instances(service).await
    }
}

pub struct FailingDiscovery;

#[async_trait]
impl ServiceDiscovery for FailingDiscovery {
    async fn instances(&self, _service: &str) -> CapResult<Vec<ServiceInstance>> {
        Err(CapabilityError::Unreachable("registry down".into()))
    }
}

pub struct FailingProvider;

#[async_trait]
impl InfrastructureProvider for FailingProvider {
    async fn get_abstraction(&self, _kind: AbstractionKind) -> CapResult<Abstraction> {
        Err(CapabilityError::Unreachable("provider down".into()))
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<CompletionEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<RouteState> {
        self.events().into_iter().map(|e| e.state).collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: &CompletionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub struct PanickingHandler;

#[async_trait]
impl ServiceHandler for PanickingHandler {
    fn name(&self) -> &'static str {
        "panicky"
    }

    async fn handle(&self, _target: &ServiceInstance, _req: &ApiRequest) -> Result<Value> {
        panic!("handler blew up");
    }
}

pub struct FailingHandler;

#[async_trait]
impl ServiceHandler for FailingHandler {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn handle(&self, _target: &ServiceInstance, _req: &ApiRequest) -> Result<Value> {
        Err(MeshError::NotFound("boom".into()))
    }
}

/// Fully wired control plane with every collaborator observable.
pub struct Harness {
    pub plane: ControlPlane,
    pub counters: Arc<CountingCounterStore>,
    pub state: Arc<CountingStateStore>,
    pub security: Arc<CountingSecurity>,
    pub discovery: Arc<CountingDiscovery>,
    pub telemetry: Arc<RecordingTelemetry>,
}

pub fn harness() -> Harness {
    harness_with(mesh_config())
}

pub fn harness_with(cfg: MeshConfig) -> Harness {
    let counters = Arc::new(CountingCounterStore::default());
    let state = Arc::new(CountingStateStore::default());
    let security = Arc::new(CountingSecurity::default());
    let discovery = Arc::new(CountingDiscovery::new(StaticDiscovery::from_config(&cfg.services)));
    let telemetry = Arc::new(RecordingTelemetry::default());

    let provider = MemoryProvider::new()
        .with(AbstractionKind::Security, Abstraction::Security(security.clone()))
        .with(AbstractionKind::Tenant, Abstraction::Tenant(Arc::new(StaticTenants::only(["acme"]))))
        .with(AbstractionKind::Cache, Abstraction::Counter(counters.clone()))
        .with(AbstractionKind::StateManagement, Abstraction::State(state.clone()));

    let plane = ControlPlane::builder(cfg)
        .provider(Arc::new(provider))
        .discovery(discovery.clone())
        .telemetry(telemetry.clone())
        .handler(Arc::new(PanickingHandler))
        .handler(Arc::new(FailingHandler))
        .build()
        .expect("control plane must build");

    Harness {
        plane,
        counters,
        state,
        security,
        discovery,
        telemetry,
    }
}
