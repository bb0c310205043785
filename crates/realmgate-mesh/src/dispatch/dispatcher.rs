use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{ApiRequest, ServiceInstance};

/// Final pipeline stage: hand the request to the selected instance.
///
/// What "dispatch" means (HTTP call, in-process call, queue publish) is up to
/// the handler; the router only times it and classifies the outcome.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, target: &ServiceInstance, req: &ApiRequest) -> Result<Value>;
}

/// Registry of handlers keyed by the name routes refer to.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<&'static str, Arc<dyn ServiceHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn register(&self, handler: Arc<dyn ServiceHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn registered(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.iter().map(|e| *e.key()).collect();
        names.sort_unstable();
        names
    }

    /// Every failure mode here (unknown handler, handler error, handler
    /// panic) surfaces as `UpstreamFailure`.
    pub async fn dispatch(&self, handler: &str, target: &ServiceInstance, req: &ApiRequest) -> Result<Value> {
        let h = self
            .handlers
            .get(handler)
            .ok_or_else(|| MeshError::UpstreamFailure(format!("no handler registered: {handler}")))?
            .value()
            .clone();

        match AssertUnwindSafe(h.handle(target, req)).catch_unwind().await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(MeshError::UpstreamFailure(msg))) => Err(MeshError::UpstreamFailure(msg)),
            Ok(Err(other)) => Err(MeshError::UpstreamFailure(format!("{handler}: {other}"))),
            Err(_) => {
                tracing::error!(handler = %handler, instance = %target.id, "handler panicked");
                Err(MeshError::UpstreamFailure(format!("{handler}: handler panicked")))
            }
        }
    }
}
