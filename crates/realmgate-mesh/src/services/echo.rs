use async_trait::async_trait;
use serde_json::{json, Value};

use realmgate_core::error::Result;
use realmgate_core::protocol::{ApiRequest, ServiceInstance};

use crate::dispatch::ServiceHandler;

/// Answers with the chosen instance and a summary of the request.
/// Useful for smoke-testing route and balancer wiring.
#[derive(Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ServiceHandler for EchoHandler {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn handle(&self, target: &ServiceInstance, req: &ApiRequest) -> Result<Value> {
        Ok(json!({
            "service": target.service,
            "instance": target.id,
            "address": target.address,
            "method": req.method,
            "path": req.path,
            "user": req.caller.as_ref().map(|c| c.user_id.as_str()),
            "body": req.body,
        }))
    }
}
