//! Load balancer: pick one live instance of a named service.
//!
//! Discovery is queried on every call; nothing about the instance list is
//! cached here. The only state kept across calls is the per-service
//! round-robin cursor, which is process-local.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;

use realmgate_core::error::MeshError;
use realmgate_core::protocol::{ServiceInstance, Strategy};

use crate::capability::ServiceDiscovery;
use crate::obs::MeshMetrics;

/// Outcome of a selection. `Unavailable` is a value, not an error, so
/// callers decide how to surface it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Selection {
    Selected(ServiceInstance),
    Unavailable { service: String, reason: String },
}

impl Selection {
    pub fn instance(&self) -> Option<&ServiceInstance> {
        match self {
            Selection::Selected(i) => Some(i),
            Selection::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Selection::Unavailable { .. })
    }

    pub fn into_result(self) -> realmgate_core::Result<ServiceInstance> {
        match self {
            Selection::Selected(i) => Ok(i),
            Selection::Unavailable { service, reason } => {
                Err(MeshError::Unavailable(format!("service {service}: {reason}")))
            }
        }
    }
}

pub struct LoadBalancer {
    discovery: Arc<dyn ServiceDiscovery>,
    cursors: DashMap<String, AtomicUsize>,
    metrics: Arc<MeshMetrics>,
}

impl LoadBalancer {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, metrics: Arc<MeshMetrics>) -> Self {
        Self {
            discovery,
            cursors: DashMap::new(),
            metrics,
        }
    }

    pub async fn select_instance(&self, service: &str, strategy: Strategy) -> Selection {
        let mut live: Vec<ServiceInstance> = match self.discovery.instances(service).await {
            Ok(list) => list.into_iter().filter(|i| i.healthy).collect(),
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "service discovery failed");
                return self.unavailable(service, strategy, format!("discovery failed: {e}"));
            }
        };

        if live.is_empty() {
            tracing::warn!(service = %service, "no live instances");
            return self.unavailable(service, strategy, "no live instances".into());
        }

        let idx = match strategy {
            Strategy::RoundRobin => self.next_cursor(service) % live.len(),
            Strategy::Random => rand::thread_rng().gen_range(0..live.len()),
            Strategy::Weighted => pick_weighted(&live, &mut rand::thread_rng()),
        };

        self.metrics.balancer_selections.inc(&[
            ("service", service),
            ("strategy", strategy.as_str()),
            ("outcome", "selected"),
        ]);

        Selection::Selected(live.swap_remove(idx))
    }

    fn next_cursor(&self, service: &str) -> usize {
        if let Some(c) = self.cursors.get(service) {
            return c.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }

    fn unavailable(&self, service: &str, strategy: Strategy, reason: String) -> Selection {
        self.metrics.balancer_selections.inc(&[
            ("service", service),
            ("strategy", strategy.as_str()),
            ("outcome", "unavailable"),
        ]);
        Selection::Unavailable {
            service: service.to_string(),
            reason,
        }
    }
}

/// Index chosen proportionally to weight. Zero total weight picks the first.
fn pick_weighted<R: Rng + ?Sized>(live: &[ServiceInstance], rng: &mut R) -> usize {
    let total: u64 = live.iter().map(|i| u64::from(i.weight)).sum();
    if total == 0 {
        return 0;
    }
    let mut point = rng.gen_range(0..total);
    for (idx, inst) in live.iter().enumerate() {
        let w = u64::from(inst.weight);
        if point < w {
            return idx;
        }
        point -= w;
    }
    live.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inst(id: &str, weight: u32) -> ServiceInstance {
        ServiceInstance::new("svc", id, format!("{id}:80")).with_weight(weight)
    }

    #[test]
    fn weighted_never_picks_zero_weight() {
        let live = vec![inst("a", 0), inst("b", 5), inst("c", 0)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(pick_weighted(&live, &mut rng), 1);
        }
    }

    #[test]
    fn weighted_zero_total_falls_back_to_first() {
        let live = vec![inst("a", 0), inst("b", 0)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_weighted(&live, &mut rng), 0);
    }
}
