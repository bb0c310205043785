//! Minimal metrics registry for the control plane.
//!
//! Counter and histogram vectors with dynamic labels backed by `DashMap`.
//! Labels are flattened into sorted key vectors to keep deterministic ordering.
//! Histogram buckets are fixed in microseconds to avoid floating point math.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self.map.entry(label_key(labels)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 when never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over every series whose labels include all of `filter`.
    pub fn sum_matching(&self, filter: &[(&str, &str)]) -> u64 {
        self.map
            .iter()
            .filter(|r| {
                filter
                    .iter()
                    .all(|(k, v)| r.key().iter().any(|(rk, rv)| rk == k && rv == v))
            })
            .map(|r| r.value().load(Ordering::Relaxed))
            .sum()
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{{{}}} {}", name, render_labels(r.key()), val);
        }
    }
}

// 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s
const BUCKETS_MICROS: [u64; 9] = [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 9],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration and increment cumulative buckets (microsecond scale).
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self.map.entry(label_key(labels)).or_default();
        let micros = duration.as_micros() as u64;

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(micros, Ordering::Relaxed);

        for (i, &b) in BUCKETS_MICROS.iter().enumerate() {
            if micros <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for r in self.map.iter() {
            let hist = r.value();
            let label_str = render_labels(r.key());
            let prefix = if label_str.is_empty() { String::new() } else { format!("{},", label_str) };

            for (i, &le) in BUCKETS_MICROS.iter().enumerate() {
                let count = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);

            let sum = hist.sum.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, label_str, sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, label_str, count);
        }
    }
}

#[derive(Default)]
pub struct MeshMetrics {
    /// realm, abstraction, outcome = success | denied | failure
    pub abstraction_access: CounterVec,
    /// outcome = allowed | denied | exempt | fail_open
    pub rate_limit_decisions: CounterVec,
    /// service, strategy, outcome = selected | unavailable
    pub balancer_selections: CounterVec,
    /// state = completed | denied | not_found | failed, kind
    pub route_requests: CounterVec,
    pub route_duration: HistogramVec, // In Microseconds
    /// outcome = completed | denied | failed
    pub state_syncs: CounterVec,
    draining: AtomicBool,
}

impl MeshMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render all registered metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.abstraction_access.render("realmgate_abstraction_access_total", &mut out);
        self.rate_limit_decisions.render("realmgate_rate_limit_decisions_total", &mut out);
        self.balancer_selections.render("realmgate_balancer_selections_total", &mut out);
        self.route_requests.render("realmgate_route_requests_total", &mut out);
        self.route_duration.render("realmgate_route_duration_micros", &mut out);
        self.state_syncs.render("realmgate_state_syncs_total", &mut out);

        let _ = writeln!(
            out,
            "# TYPE realmgate_draining gauge\nrealmgate_draining {}",
            if self.is_draining() { 1 } else { 0 }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_order_independent() {
        let c = CounterVec::default();
        c.inc(&[("realm", "content"), ("outcome", "success")]);
        c.inc(&[("outcome", "success"), ("realm", "content")]);
        assert_eq!(c.get(&[("realm", "content"), ("outcome", "success")]), 2);
        assert_eq!(c.sum_matching(&[("realm", "content")]), 2);
        assert_eq!(c.sum_matching(&[("realm", "insights")]), 0);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let m = MeshMetrics::default();
        let labels = [("state", "completed")];
        m.route_duration.observe(&labels, Duration::from_micros(700));
        m.route_duration.observe(&labels, Duration::from_millis(7));
        assert_eq!(m.route_duration.count(&labels), 2);

        let text = m.render();
        for (le, n) in [("500", 0), ("1000", 1), ("5000", 1), ("10000", 2), ("+Inf", 2)] {
            let line = format!("realmgate_route_duration_micros_bucket{{state=\"completed\",le=\"{le}\"}} {n}");
            assert!(text.contains(&line), "missing {line}");
        }
    }
}
