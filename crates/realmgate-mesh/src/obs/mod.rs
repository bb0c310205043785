//! Lightweight in-process metrics and request telemetry.
//!
//! Metrics are stored as atomics and rendered by the `/metrics` handler.
//! Completion events go through a pluggable `TelemetrySink`.

pub mod metrics;
pub mod telemetry;

pub use metrics::{CounterVec, HistogramVec, MeshMetrics};
pub use telemetry::{CompletionEvent, RouteState, TelemetrySink, TracingTelemetry};
