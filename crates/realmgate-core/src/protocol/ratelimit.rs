//! Rate-limit keys and admission decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical subject a rate limit is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "subject", rename_all = "snake_case")]
pub enum KeySpec {
    User(String),
    Api(String),
    Ip(String),
    Global,
}

impl KeySpec {
    /// Limit type label (`user`, `api`, `ip`, `global`).
    pub fn limit_type(&self) -> &'static str {
        match self {
            KeySpec::User(_) => "user",
            KeySpec::Api(_) => "api",
            KeySpec::Ip(_) => "ip",
            KeySpec::Global => "global",
        }
    }

    /// Key as stored in the shared counter store.
    pub fn storage_key(&self) -> String {
        format!("rate_limit:{self}")
    }
}

/// Deterministic key: `user:<id>`, `api:<path>`, `ip:<addr>`, or `global`.
impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::User(id) => write!(f, "user:{id}"),
            KeySpec::Api(path) => write!(f, "api:{path}"),
            KeySpec::Ip(addr) => write!(f, "ip:{addr}"),
            KeySpec::Global => f.write_str("global"),
        }
    }
}

/// Window length and ceiling for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPolicy {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub key: String,
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the caller should retry (the window length).
    pub reset_after_secs: u64,
    /// Unix timestamp (seconds) at which the window is guaranteed to have rolled.
    pub reset_time: u64,
    /// True when the counter store was unreachable and the request was let through.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fail_open: bool,
    /// True when the path is on the static exclusion list.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exempt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(KeySpec::User("42".into()).to_string(), "user:42");
        assert_eq!(KeySpec::Api("/api/v1/x".into()).to_string(), "api:/api/v1/x");
        assert_eq!(KeySpec::Ip("10.0.0.1".into()).to_string(), "ip:10.0.0.1");
        assert_eq!(KeySpec::Global.to_string(), "global");
        assert_eq!(KeySpec::Global.storage_key(), "rate_limit:global");
    }
}
