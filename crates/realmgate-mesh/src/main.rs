//! realmgate control plane
//!
//! - Loads the realm/route/rate-limit config (`REALMGATE_CONFIG`, default `realmgate.yaml`)
//! - Binds the in-memory infrastructure provider and static discovery
//! - Serves the operational endpoints; Ctrl-C flips readiness to draining

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use realmgate_core::error::{MeshError, Result};
use realmgate_mesh::capability::memory::{MemoryProvider, StaticDiscovery};
use realmgate_mesh::{config, router, ControlPlane};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var("REALMGATE_CONFIG").unwrap_or_else(|_| "realmgate.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| MeshError::Config(format!("gateway.listen must be a valid SocketAddr: {e}")))?;

    let discovery = Arc::new(StaticDiscovery::from_config(&cfg.services));
    let plane = ControlPlane::builder(cfg)
        .provider(Arc::new(MemoryProvider::standard()))
        .discovery(discovery)
        .build()?;
    let app = router::build_router(plane.clone());

    tracing::info!(%listen, config = %path, "realmgate starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| MeshError::Internal(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(plane))
        .await
        .map_err(|e| MeshError::Internal(format!("server failed: {e}")))
}

async fn shutdown(plane: ControlPlane) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    plane.set_draining();
    tracing::info!("shutdown requested; draining");
}
