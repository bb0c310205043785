//! State synchronization records.
//!
//! Status only ever moves forward: `Requested -> Completed | Failed`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    #[default]
    Full,
    Incremental,
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Requested,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    /// Only `Requested -> {Completed, Failed}` is legal; terminal states are final.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Requested, SyncStatus::Completed) | (SyncStatus::Requested, SyncStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Requested => "requested",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

/// What a business service asks to propagate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub key: String,
    pub source_realm: String,
    pub target_realm: String,
    pub payload: Value,
    #[serde(default)]
    pub sync_type: SyncType,
    #[serde(default)]
    pub priority: SyncPriority,
    #[serde(default)]
    pub caller: Option<crate::protocol::api::CallerContext>,
}

/// Auditable record handed to (and retained by) the state-management store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub sync_id: String,
    pub key: String,
    pub source_realm: String,
    pub target_realm: String,
    pub payload: Value,
    pub sync_type: SyncType,
    pub priority: SyncPriority,
    pub status: SyncStatus,
}

impl SyncRecord {
    pub fn requested(sync_id: String, req: &SyncRequest) -> Self {
        Self {
            sync_id,
            key: req.key.clone(),
            source_realm: req.source_realm.clone(),
            target_realm: req.target_realm.clone(),
            payload: req.payload.clone(),
            sync_type: req.sync_type,
            priority: req.priority,
            status: SyncStatus::Requested,
        }
    }

    /// Move to `next`, refusing any regression out of a terminal status.
    pub fn advance(&mut self, next: SyncStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MeshError::Internal(format!(
                "illegal sync transition {} -> {} (sync_id={})",
                self.status.as_str(),
                next.as_str(),
                self.sync_id
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Envelope payload returned by `sync_state` / `get_sync_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReceipt {
    pub key: String,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
}
