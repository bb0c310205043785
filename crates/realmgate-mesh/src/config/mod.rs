//! Mesh config loader (strict parsing).

pub mod schema;

use std::fs;

use realmgate_core::error::{MeshError, Result};

pub use schema::{
    GatewaySection, InstanceConfig, MeshConfig, RateClass, RateLimitSection, RealmConfig, RouteConfig,
};

pub fn load_from_file(path: &str) -> Result<MeshConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MeshError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MeshConfig> {
    let cfg: MeshConfig = serde_yaml::from_str(s)
        .map_err(|e| MeshError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
