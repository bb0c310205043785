//! Capability Gateway: the single choke point between realms and the
//! Infrastructure Provider.
//!
//! Every fetch goes allow-list first, provider second. Denials and provider
//! failures are tallied as distinct classes per (realm, abstraction).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{AbstractionKind, RealmCapability};

use crate::capability::{
    Abstraction, CounterStore, InfrastructureProvider, SecurityCapability, StateStore, TenantCapability,
};
use crate::obs::MeshMetrics;

use super::allowlist::RealmMap;

#[derive(Default)]
struct AccessCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    denials: AtomicU64,
    failures: AtomicU64,
}

impl AccessCounters {
    fn load(&self) -> AccessRecord {
        AccessRecord {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one (realm, abstraction) tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub attempts: u64,
    pub successes: u64,
    pub denials: u64,
    pub failures: u64,
}

/// Process-lifetime access tallies, reset only on restart.
#[derive(Default)]
pub struct AccessLedger {
    records: DashMap<(String, AbstractionKind), AccessCounters>,
}

enum AccessOutcome {
    Success,
    Denied,
    Failure,
}

impl AccessLedger {
    fn record(&self, realm: &str, kind: AbstractionKind, outcome: AccessOutcome) {
        let entry = self.records.entry((realm.to_string(), kind)).or_default();
        entry.attempts.fetch_add(1, Ordering::Relaxed);
        let slot = match outcome {
            AccessOutcome::Success => &entry.successes,
            AccessOutcome::Denied => &entry.denials,
            AccessOutcome::Failure => &entry.failures,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, realm: &str, kind: AbstractionKind) -> AccessRecord {
        self.records
            .get(&(realm.to_string(), kind))
            .map(|c| c.load())
            .unwrap_or_default()
    }

    /// realm -> abstraction -> tally, deterministically ordered.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, AccessRecord>> {
        let mut out: BTreeMap<String, BTreeMap<String, AccessRecord>> = BTreeMap::new();
        for r in self.records.iter() {
            let (realm, kind) = r.key();
            out.entry(realm.clone())
                .or_default()
                .insert(kind.as_str().to_string(), r.value().load());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub provider_bound: bool,
    pub realms: usize,
    pub total_denials: u64,
    pub total_failures: u64,
}

pub struct CapabilityGateway {
    realms: Arc<RealmMap>,
    provider: Arc<dyn InfrastructureProvider>,
    ledger: AccessLedger,
    metrics: Arc<MeshMetrics>,
}

impl CapabilityGateway {
    /// Bind the static realm table to the Infrastructure Provider.
    /// Without a provider the platform cannot start.
    pub fn initialize(
        realms: RealmMap,
        provider: Option<Arc<dyn InfrastructureProvider>>,
        metrics: Arc<MeshMetrics>,
    ) -> Result<Self> {
        let provider = provider.ok_or_else(|| {
            MeshError::Config("infrastructure provider is required to start the capability gateway".into())
        })?;
        tracing::info!(realms = realms.len(), "capability gateway initialized");
        Ok(Self {
            realms: Arc::new(realms),
            provider,
            ledger: AccessLedger::default(),
            metrics,
        })
    }

    /// Pure allow-list lookup; no side effects.
    pub fn validate_access(&self, realm: &str, kind: AbstractionKind) -> bool {
        self.realms.is_allowed(realm, kind)
    }

    /// String-keyed allow-list lookup. Names outside the closed set are denied.
    pub fn validate_access_name(&self, realm: &str, name: &str) -> bool {
        self.realms.is_allowed_name(realm, name)
    }

    pub fn realm_has(&self, realm: &str, cap: RealmCapability) -> bool {
        self.realms.has_capability(realm, cap)
    }

    pub fn knows_realm(&self, realm: &str) -> bool {
        self.realms.realm(realm).is_some()
    }

    pub async fn get_abstraction(&self, realm: &str, kind: AbstractionKind) -> Result<Abstraction> {
        self.fetch_as(realm, kind, Ok).await
    }

    pub async fn security(&self, realm: &str) -> Result<Arc<dyn SecurityCapability>> {
        self.fetch_as(realm, AbstractionKind::Security, |h| match h {
            Abstraction::Security(s) => Ok(s),
            other => Err(other),
        })
        .await
    }

    pub async fn tenant(&self, realm: &str) -> Result<Arc<dyn TenantCapability>> {
        self.fetch_as(realm, AbstractionKind::Tenant, |h| match h {
            Abstraction::Tenant(t) => Ok(t),
            other => Err(other),
        })
        .await
    }

    pub async fn counter_store(&self, realm: &str) -> Result<Arc<dyn CounterStore>> {
        self.fetch_as(realm, AbstractionKind::Cache, |h| match h {
            Abstraction::Counter(c) => Ok(c),
            other => Err(other),
        })
        .await
    }

    pub async fn state_store(&self, realm: &str) -> Result<Arc<dyn StateStore>> {
        self.fetch_as(realm, AbstractionKind::StateManagement, |h| match h {
            Abstraction::State(s) => Ok(s),
            other => Err(other),
        })
        .await
    }

    /// Allow-list check, provider fetch, then handle extraction. Exactly one
    /// outcome is tallied; a handle of the wrong type counts as a failure.
    async fn fetch_as<T>(
        &self,
        realm: &str,
        kind: AbstractionKind,
        extract: fn(Abstraction) -> std::result::Result<T, Abstraction>,
    ) -> Result<T> {
        if !self.validate_access(realm, kind) {
            self.tally(realm, kind, AccessOutcome::Denied);
            tracing::warn!(realm = %realm, abstraction = %kind, "abstraction access denied");
            return Err(MeshError::access_denied(realm, kind.as_str()));
        }

        let handle = match self.provider.get_abstraction(kind).await {
            Ok(handle) => handle,
            Err(e) => {
                self.tally(realm, kind, AccessOutcome::Failure);
                tracing::error!(realm = %realm, abstraction = %kind, error = %e, "provider fetch failed");
                return Err(e.into());
            }
        };

        match extract(handle) {
            Ok(typed) => {
                self.tally(realm, kind, AccessOutcome::Success);
                Ok(typed)
            }
            Err(other) => {
                self.tally(realm, kind, AccessOutcome::Failure);
                tracing::error!(realm = %realm, abstraction = %kind, handle = other.variant(), "provider returned wrong handle type");
                Err(mismatch(kind, &other))
            }
        }
    }

    /// Static allow-list of a realm (empty for unknown realms).
    pub fn get_realm_abstractions(&self, realm: &str) -> Vec<AbstractionKind> {
        self.realms
            .realm(realm)
            .map(|r| r.abstractions().collect())
            .unwrap_or_default()
    }

    pub fn access_record(&self, realm: &str, kind: AbstractionKind) -> AccessRecord {
        self.ledger.get(realm, kind)
    }

    pub fn get_access_metrics(&self) -> BTreeMap<String, BTreeMap<String, AccessRecord>> {
        self.ledger.snapshot()
    }

    pub fn health_check(&self) -> GatewayHealth {
        let snapshot = self.ledger.snapshot();
        let (denials, failures) = snapshot
            .values()
            .flat_map(|m| m.values())
            .fold((0, 0), |(d, f), r| (d + r.denials, f + r.failures));
        GatewayHealth {
            status: if self.realms.is_empty() { "degraded" } else { "healthy" },
            provider_bound: true,
            realms: self.realms.len(),
            total_denials: denials,
            total_failures: failures,
        }
    }

    fn tally(&self, realm: &str, kind: AbstractionKind, outcome: AccessOutcome) {
        let label = match outcome {
            AccessOutcome::Success => "success",
            AccessOutcome::Denied => "denied",
            AccessOutcome::Failure => "failure",
        };
        self.metrics.abstraction_access.inc(&[
            ("realm", realm),
            ("abstraction", kind.as_str()),
            ("outcome", label),
        ]);
        self.ledger.record(realm, kind, outcome);
    }
}

fn mismatch(kind: AbstractionKind, got: &Abstraction) -> MeshError {
    MeshError::Internal(format!(
        "provider returned a {} handle for abstraction {kind}",
        got.variant()
    ))
}
