//! Shared error type across realmgate crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure kinds surfaced to callers (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Realm/abstraction not allow-listed, or authorization/tenant check failed.
    PolicyDenied,
    /// Admission refused by the rate limiter.
    RateLimited,
    /// No route for path + method.
    NotFound,
    /// No live instance, or a backing store is unreachable.
    Unavailable,
    /// A dispatched instance or backing store returned an error.
    UpstreamFailure,
    /// Bootstrap/configuration fault, including a provider wired with the
    /// wrong handle type for a kind.
    Internal,
}

impl ErrorKind {
    /// String representation used in JSON responses and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PolicyDenied => "POLICY_DENIED",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// HTTP-style status code paired with this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::PolicyDenied => 403,
            ErrorKind::RateLimited => 429,
            ErrorKind::NotFound => 404,
            ErrorKind::Unavailable => 503,
            ErrorKind::UpstreamFailure | ErrorKind::Internal => 500,
        }
    }

    /// Policy violations are never worth retrying; everything else may be.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::PolicyDenied | ErrorKind::NotFound | ErrorKind::Internal)
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type used by core and mesh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("access denied: realm '{realm}' may not use abstraction '{abstraction}'")]
    AccessDenied { realm: String, abstraction: String },
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MeshError {
    /// Map to the closed error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeshError::AccessDenied { .. } | MeshError::PolicyDenied(_) => ErrorKind::PolicyDenied,
            MeshError::RateLimited { .. } => ErrorKind::RateLimited,
            MeshError::NotFound(_) => ErrorKind::NotFound,
            MeshError::Unavailable(_) => ErrorKind::Unavailable,
            MeshError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            MeshError::Config(_) | MeshError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Retry hint in seconds (rate limiting only).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            MeshError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn access_denied(realm: impl Into<String>, abstraction: impl Into<String>) -> Self {
        MeshError::AccessDenied {
            realm: realm.into(),
            abstraction: abstraction.into(),
        }
    }
}
