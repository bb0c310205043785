use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{AbstractionKind, Method, RealmCapability, Strategy, WindowPolicy};

/// Kinds the control plane fetches through `gateway.control_realm`: caller
/// checks, tenant isolation, rate-limit counters and sync status reads.
pub const CONTROL_REALM_KINDS: [AbstractionKind; 4] = [
    AbstractionKind::Security,
    AbstractionKind::Tenant,
    AbstractionKind::Cache,
    AbstractionKind::StateManagement,
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub realms: Vec<RealmConfig>,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Static discovery source: service name -> instances.
    #[serde(default)]
    pub services: BTreeMap<String, Vec<InstanceConfig>>,
}

impl MeshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::Config(format!("unsupported config version: {}", self.version)));
        }
        if self.realms.is_empty() {
            return Err(MeshError::Config("realms must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for r in &self.realms {
            if !seen.insert(r.id.as_str()) {
                return Err(MeshError::Config(format!("duplicate realm id: {}", r.id)));
            }
            for name in &r.abstractions {
                name.parse::<AbstractionKind>()
                    .map_err(|e| MeshError::Config(format!("realm {}: {e}", r.id)))?;
            }
        }
        let control = &self.gateway.control_realm;
        let Some(control_cfg) = self.realms.iter().find(|r| &r.id == control) else {
            return Err(MeshError::Config(format!(
                "gateway.control_realm '{control}' is not a configured realm"
            )));
        };
        let missing: Vec<&str> = CONTROL_REALM_KINDS
            .iter()
            .map(|k| k.as_str())
            .filter(|k| !control_cfg.abstractions.iter().any(|a| a.as_str() == *k))
            .collect();
        if !missing.is_empty() {
            return Err(MeshError::Config(format!(
                "gateway.control_realm '{control}' must allow-list: {}",
                missing.join(", ")
            )));
        }

        self.rate_limit.validate()?;

        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(MeshError::Config(format!("route path must start with '/': {}", route.path)));
            }
            if let Some(class) = &route.rate_class {
                if !self.rate_limit.classes.contains_key(class) {
                    return Err(MeshError::Config(format!(
                        "route {} {} references unknown rate_class: {class}",
                        route.method, route.path
                    )));
                }
            }
        }

        for (svc, instances) in &self.services {
            let mut ids = HashSet::new();
            for i in instances {
                if !ids.insert(i.id.as_str()) {
                    return Err(MeshError::Config(format!("service {svc}: duplicate instance id {}", i.id)));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Realm the control plane itself uses to reach security/tenant/cache/state.
    #[serde(default = "default_control_realm")]
    pub control_realm: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            control_realm: default_control_realm(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_control_realm() -> String {
    "smart_city".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealmConfig {
    pub id: String,
    #[serde(default)]
    pub abstractions: Vec<String>,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<RealmCapability>,
}

fn default_capabilities() -> Vec<RealmCapability> {
    RealmCapability::ALL.to_vec()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Read-only, idempotent paths that never consume admission.
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    #[serde(default)]
    pub classes: BTreeMap<String, RateClass>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            exempt_paths: default_exempt_paths(),
            classes: BTreeMap::new(),
        }
    }
}

impl RateLimitSection {
    pub fn validate(&self) -> Result<()> {
        validate_window("rate_limit", self.window_secs, self.max_requests)?;
        for (name, c) in &self.classes {
            validate_window(&format!("rate_limit.classes.{name}"), c.window_secs, c.max_requests)?;
        }
        Ok(())
    }

    pub fn default_policy(&self) -> WindowPolicy {
        WindowPolicy {
            window_secs: self.window_secs,
            max_requests: self.max_requests,
        }
    }
}

fn validate_window(scope: &str, window_secs: u64, max_requests: u32) -> Result<()> {
    if !(1..=86_400).contains(&window_secs) {
        return Err(MeshError::Config(format!("{scope}.window_secs must be between 1 and 86400")));
    }
    if max_requests == 0 {
        return Err(MeshError::Config(format!("{scope}.max_requests must be at least 1")));
    }
    Ok(())
}

fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> u32 {
    100
}
fn default_exempt_paths() -> Vec<String> {
    ["/health", "/healthz", "/readyz", "/metrics"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateClass {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl From<RateClass> for WindowPolicy {
    fn from(c: RateClass) -> Self {
        WindowPolicy {
            window_secs: c.window_secs,
            max_requests: c.max_requests,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub path: String,
    pub method: Method,
    pub service: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default)]
    pub rate_class: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_handler() -> String {
    "echo".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub id: String,
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_weight() -> u32 {
    1
}
fn default_healthy() -> bool {
    true
}
