//! Uniform response envelope for every operation exposed by the control plane.
//!
//! Shape on the wire: `{ "success": bool, ...payload, "error"?: {..} }`.

use serde::Serialize;

use crate::error::{ErrorKind, MeshError};

/// Structured error attached to a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&MeshError> for ErrorBody {
    fn from(e: &MeshError) -> Self {
        let kind = e.kind();
        Self {
            kind,
            code: kind.as_str(),
            status_code: kind.status_code(),
            message: e.to_string(),
            retry_after_secs: e.retry_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn fail(err: &MeshError) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(err.into()),
        }
    }

    /// Failure that still reports a payload (e.g. a sync record in FAILED state).
    pub fn fail_with(payload: T, err: &MeshError) -> Self {
        Self {
            success: false,
            payload: Some(payload),
            error: Some(err.into()),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl<T> From<crate::Result<T>> for Envelope<T> {
    fn from(r: crate::Result<T>) -> Self {
        match r {
            Ok(v) => Envelope::ok(v),
            Err(e) => Envelope::fail(&e),
        }
    }
}
