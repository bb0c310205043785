//! Request completion telemetry.
//!
//! The router emits exactly one `CompletionEvent` per request, whatever the
//! terminal state.

use std::time::Duration;

use serde::Serialize;
use realmgate_core::error::ErrorKind;
use realmgate_core::protocol::Method;

/// Router pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteState {
    Received,
    Authorized,
    Denied,
    RateChecked,
    Routed,
    NotFound,
    Dispatched,
    Completed,
    Failed,
}

impl RouteState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RouteState::Denied | RouteState::NotFound | RouteState::Completed | RouteState::Failed
        )
    }

    /// Terminal state reached by a request that failed with `kind`.
    pub fn terminal_for(kind: ErrorKind) -> RouteState {
        match kind {
            ErrorKind::PolicyDenied => RouteState::Denied,
            ErrorKind::NotFound => RouteState::NotFound,
            _ => RouteState::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteState::Received => "received",
            RouteState::Authorized => "authorized",
            RouteState::Denied => "denied",
            RouteState::RateChecked => "rate_checked",
            RouteState::Routed => "routed",
            RouteState::NotFound => "not_found",
            RouteState::Dispatched => "dispatched",
            RouteState::Completed => "completed",
            RouteState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub request_id: String,
    pub path: String,
    pub method: Method,
    pub state: RouteState,
    pub kind: Option<ErrorKind>,
    pub status_code: u16,
    pub duration: Duration,
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &CompletionEvent);
}

/// Default sink: one structured tracing event per completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &CompletionEvent) {
        tracing::info!(
            target: "realmgate::telemetry",
            request_id = %event.request_id,
            method = %event.method,
            path = %event.path,
            state = event.state.as_str(),
            kind = event.kind.map(|k| k.as_str()).unwrap_or("-"),
            status = event.status_code,
            duration_us = event.duration.as_micros() as u64,
            "request completed"
        );
    }
}
