//! Capability seam: the interfaces this core consumes from the outside.
//!
//! The Infrastructure Provider hands out abstraction instances by kind. The
//! handles are typed for the capabilities the control plane itself drives
//! (security, tenant, counter store, state store); everything else is an
//! opaque handle the core passes through without inspecting.

pub mod memory;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use realmgate_core::error::MeshError;
use realmgate_core::protocol::{AbstractionKind, CallerContext, ServiceInstance, SyncRecord, SyncStatus};

/// Failures reported by external collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// Backing system could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// Backing system answered with an error.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Provider has no instance for this kind.
    #[error("no provider instance for {0}")]
    Missing(AbstractionKind),
}

impl From<CapabilityError> for MeshError {
    fn from(e: CapabilityError) -> Self {
        match e {
            CapabilityError::Unreachable(_) | CapabilityError::Missing(_) => {
                MeshError::Unavailable(e.to_string())
            }
            CapabilityError::Rejected(msg) => MeshError::UpstreamFailure(msg),
        }
    }
}

pub type CapResult<T> = std::result::Result<T, CapabilityError>;

#[async_trait]
pub trait SecurityCapability: Send + Sync {
    async fn check_permissions(&self, caller: &CallerContext, resource: &str, action: &str) -> CapResult<bool>;
}

#[async_trait]
pub trait TenantCapability: Send + Sync {
    async fn validate_tenant_access(&self, tenant_id: &str) -> CapResult<bool>;
}

/// Result of a capped increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Entry recorded; live count after the write.
    Admitted(u64),
    /// Cap already reached; nothing recorded. Live count at refusal.
    Refused(u64),
}

/// Narrow key/TTL counter interface. Each `increment` records one entry that
/// lives for `ttl`; `get` returns the number of live entries for the key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> CapResult<u64>;
    async fn increment(&self, key: &str, ttl: Duration) -> CapResult<u64>;
    /// Record one entry only while the live count is below `max`, as a single
    /// store-side step. Concurrent callers must never push the count past `max`.
    async fn increment_below(&self, key: &str, ttl: Duration, max: u64) -> CapResult<Admission>;
    async fn delete(&self, key: &str) -> CapResult<()>;
}

/// State-management capability. Owns and retains sync records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist and apply the record; returns the terminal status the store reached.
    async fn sync_state(&self, record: SyncRecord) -> CapResult<SyncStatus>;
    async fn sync_status(&self, sync_id: &str) -> CapResult<Option<SyncRecord>>;
    /// Settle a record still in `Requested` as `Failed`. Terminal records are refused.
    async fn fail_sync(&self, sync_id: &str) -> CapResult<SyncStatus>;
}

/// Source of live service instances. Queried on every selection.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn instances(&self, service: &str) -> CapResult<Vec<ServiceInstance>>;
}

/// Typed handle to an abstraction instance owned by the provider.
#[derive(Clone)]
pub enum Abstraction {
    Security(Arc<dyn SecurityCapability>),
    Tenant(Arc<dyn TenantCapability>),
    Counter(Arc<dyn CounterStore>),
    State(Arc<dyn StateStore>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Abstraction {
    pub fn variant(&self) -> &'static str {
        match self {
            Abstraction::Security(_) => "security",
            Abstraction::Tenant(_) => "tenant",
            Abstraction::Counter(_) => "counter",
            Abstraction::State(_) => "state",
            Abstraction::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for Abstraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Abstraction::{}", self.variant())
    }
}

/// The Infrastructure Provider boundary. The gateway never constructs or
/// destroys what it hands out.
#[async_trait]
pub trait InfrastructureProvider: Send + Sync {
    async fn get_abstraction(&self, kind: AbstractionKind) -> CapResult<Abstraction>;
}
