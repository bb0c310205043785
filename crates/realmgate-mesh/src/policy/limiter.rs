//! Sliding-window admission control keyed by `KeySpec`.
//!
//! Counter state lives in the shared Cache capability (reached through the
//! gateway), never in this process, so any number of mesh instances can
//! admit against the same window. When that store is unreachable the limiter
//! fails open.
//!
//! Each named rate class counts in its own bucket (`rate_limit:class:<name>:<key>`),
//! so a class's window only ever sees entries admitted under that class.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use realmgate_core::error::Result;
use realmgate_core::protocol::{KeySpec, RateLimitDecision, WindowPolicy};

use crate::capability::Admission;
use crate::config::RateLimitSection;
use crate::obs::MeshMetrics;

use super::gateway::CapabilityGateway;

pub struct RateLimiter {
    gateway: Arc<CapabilityGateway>,
    /// Realm the limiter borrows the Cache capability through.
    realm: String,
    default_policy: WindowPolicy,
    classes: BTreeMap<String, WindowPolicy>,
    exempt_paths: HashSet<String>,
    metrics: Arc<MeshMetrics>,
}

impl RateLimiter {
    pub fn new(
        gateway: Arc<CapabilityGateway>,
        realm: impl Into<String>,
        section: &RateLimitSection,
        metrics: Arc<MeshMetrics>,
    ) -> Self {
        Self {
            gateway,
            realm: realm.into(),
            default_policy: section.default_policy(),
            classes: section
                .classes
                .iter()
                .map(|(name, c)| (name.clone(), WindowPolicy::from(*c)))
                .collect(),
            exempt_paths: section.exempt_paths.iter().cloned().collect(),
            metrics,
        }
    }

    pub fn default_policy(&self) -> WindowPolicy {
        self.default_policy
    }

    /// Policy of a configured rate class.
    pub fn class_policy(&self, class: &str) -> Option<WindowPolicy> {
        self.classes.get(class).copied()
    }

    /// Static exclusion list for read-only, idempotent paths.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    /// Admit or refuse one request against `policy` in the default bucket.
    ///
    /// The request that would push the live count past `max_requests` is
    /// the one refused; a refusal records nothing.
    pub async fn check(&self, key: &KeySpec, policy: WindowPolicy) -> RateLimitDecision {
        self.check_in(None, key, policy).await
    }

    /// Same as [`check`](Self::check), counted in `class`'s bucket when given.
    pub async fn check_in(&self, class: Option<&str>, key: &KeySpec, policy: WindowPolicy) -> RateLimitDecision {
        if let KeySpec::Api(path) = key {
            if self.is_exempt(path) {
                return self.exempt(key, policy);
            }
        }

        let storage_key = bucket_key(class, key);
        let window = Duration::from_secs(policy.window_secs);

        let store = match self.gateway.counter_store(&self.realm).await {
            Ok(s) => s,
            Err(e) => return self.fail_open(key, policy, &e.to_string()),
        };

        match store
            .increment_below(&storage_key, window, u64::from(policy.max_requests))
            .await
        {
            Ok(Admission::Admitted(now_count)) => {
                let used = u32::try_from(now_count).unwrap_or(u32::MAX);
                self.metrics.rate_limit_decisions.inc(&[("outcome", "allowed")]);
                decision(key, policy, true, policy.max_requests.saturating_sub(used))
            }
            Ok(Admission::Refused(count)) => {
                self.metrics.rate_limit_decisions.inc(&[("outcome", "denied")]);
                tracing::warn!(key = %key, class = class.unwrap_or("default"), count, max = policy.max_requests, "rate limit exceeded");
                decision(key, policy, false, 0)
            }
            Err(e) => self.fail_open(key, policy, &e.to_string()),
        }
    }

    /// Administrative reset: drop every recorded entry for `key`, in the
    /// default bucket and in every class bucket.
    pub async fn reset(&self, key: &KeySpec) -> Result<()> {
        let store = self.gateway.counter_store(&self.realm).await?;
        store.delete(&key.storage_key()).await?;
        for class in self.classes.keys() {
            store.delete(&bucket_key(Some(class.as_str()), key)).await?;
        }
        tracing::info!(key = %key, "rate limit reset");
        Ok(())
    }

    fn exempt(&self, key: &KeySpec, policy: WindowPolicy) -> RateLimitDecision {
        self.metrics.rate_limit_decisions.inc(&[("outcome", "exempt")]);
        RateLimitDecision {
            exempt: true,
            ..decision(key, policy, true, policy.max_requests)
        }
    }

    fn fail_open(&self, key: &KeySpec, policy: WindowPolicy, reason: &str) -> RateLimitDecision {
        self.metrics.rate_limit_decisions.inc(&[("outcome", "fail_open")]);
        tracing::warn!(key = %key, reason = %reason, "counter store unavailable; failing open");
        RateLimitDecision {
            fail_open: true,
            ..decision(key, policy, true, 0)
        }
    }
}

fn bucket_key(class: Option<&str>, key: &KeySpec) -> String {
    match class {
        Some(c) => format!("rate_limit:class:{c}:{key}"),
        None => key.storage_key(),
    }
}

fn decision(key: &KeySpec, policy: WindowPolicy, allowed: bool, remaining: u32) -> RateLimitDecision {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    RateLimitDecision {
        key: key.to_string(),
        allowed,
        remaining,
        reset_after_secs: policy.window_secs,
        reset_time: now + policy.window_secs,
        fail_open: false,
        exempt: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_buckets_never_share_the_default_key() {
        let user = KeySpec::User("42".into());
        assert_eq!(bucket_key(None, &user), "rate_limit:user:42");
        assert_eq!(bucket_key(Some("uploads"), &user), "rate_limit:class:uploads:user:42");
        assert_ne!(bucket_key(Some("user"), &KeySpec::User("42".into())), bucket_key(None, &KeySpec::User("user:42".into())));
    }
}
