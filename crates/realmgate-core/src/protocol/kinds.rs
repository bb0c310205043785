//! Closed set of infrastructure abstraction kinds and realm capability flags.
//!
//! Realms name abstractions in configuration as snake_case strings. Names are
//! parsed once into `AbstractionKind`; an unknown name is a configuration
//! error, and a runtime lookup of an unknown name is simply "not allowed".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// A named, swappable infrastructure capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionKind {
    Auth,
    Authorization,
    Security,
    Session,
    Tenant,
    FileManagement,
    ContentMetadata,
    Llm,
    Mcp,
    Agui,
    Policy,
    ToolStorage,
    Config,
    Cache,
    StateManagement,
    Messaging,
    EventManagement,
    Websocket,
    EventBus,
    Telemetry,
    Log,
}

impl AbstractionKind {
    pub const ALL: [AbstractionKind; 21] = [
        AbstractionKind::Auth,
        AbstractionKind::Authorization,
        AbstractionKind::Security,
        AbstractionKind::Session,
        AbstractionKind::Tenant,
        AbstractionKind::FileManagement,
        AbstractionKind::ContentMetadata,
        AbstractionKind::Llm,
        AbstractionKind::Mcp,
        AbstractionKind::Agui,
        AbstractionKind::Policy,
        AbstractionKind::ToolStorage,
        AbstractionKind::Config,
        AbstractionKind::Cache,
        AbstractionKind::StateManagement,
        AbstractionKind::Messaging,
        AbstractionKind::EventManagement,
        AbstractionKind::Websocket,
        AbstractionKind::EventBus,
        AbstractionKind::Telemetry,
        AbstractionKind::Log,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AbstractionKind::Auth => "auth",
            AbstractionKind::Authorization => "authorization",
            AbstractionKind::Security => "security",
            AbstractionKind::Session => "session",
            AbstractionKind::Tenant => "tenant",
            AbstractionKind::FileManagement => "file_management",
            AbstractionKind::ContentMetadata => "content_metadata",
            AbstractionKind::Llm => "llm",
            AbstractionKind::Mcp => "mcp",
            AbstractionKind::Agui => "agui",
            AbstractionKind::Policy => "policy",
            AbstractionKind::ToolStorage => "tool_storage",
            AbstractionKind::Config => "config",
            AbstractionKind::Cache => "cache",
            AbstractionKind::StateManagement => "state_management",
            AbstractionKind::Messaging => "messaging",
            AbstractionKind::EventManagement => "event_management",
            AbstractionKind::Websocket => "websocket",
            AbstractionKind::EventBus => "event_bus",
            AbstractionKind::Telemetry => "telemetry",
            AbstractionKind::Log => "log",
        }
    }
}

impl fmt::Display for AbstractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbstractionKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AbstractionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MeshError::Config(format!("unknown abstraction: {s}")))
    }
}

/// Per-realm capability flags (what the realm may do on the mesh itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealmCapability {
    /// Realm services may issue requests through the API router.
    RouteRequests,
    /// Realm may act as the source of a state sync.
    PublishState,
    /// Realm may act as the target of a state sync.
    ReceiveState,
}

impl RealmCapability {
    pub const ALL: [RealmCapability; 3] = [
        RealmCapability::RouteRequests,
        RealmCapability::PublishState,
        RealmCapability::ReceiveState,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_parses_back_from_its_name() {
        for k in AbstractionKind::ALL {
            assert_eq!(k.as_str().parse::<AbstractionKind>(), Ok(k));
        }
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let res = "teleporter".parse::<AbstractionKind>();
        assert!(matches!(res, Err(MeshError::Config(_))));
    }
}
