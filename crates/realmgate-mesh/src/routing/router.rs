//! API router: authorize -> rate-limit -> route -> balance -> dispatch.
//!
//! Stages run strictly in order and the first failure ends the request.
//! Exactly one completion event is recorded per request, whatever the
//! terminal state.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use realmgate_core::error::{ErrorKind, MeshError, Result};
use realmgate_core::protocol::{ApiRequest, ApiResponse, CallerContext, KeySpec, RealmCapability, WindowPolicy};

use crate::balance::LoadBalancer;
use crate::dispatch::Dispatcher;
use crate::obs::{CompletionEvent, MeshMetrics, RouteState, TelemetrySink};
use crate::policy::{CapabilityGateway, RateLimiter};

use super::table::RouteTable;

pub struct ApiRouter {
    gateway: Arc<CapabilityGateway>,
    /// Realm through which Security and Tenant are fetched.
    realm: String,
    limiter: Arc<RateLimiter>,
    routes: Arc<RouteTable>,
    balancer: Arc<LoadBalancer>,
    dispatcher: Arc<Dispatcher>,
    telemetry: Arc<dyn TelemetrySink>,
    metrics: Arc<MeshMetrics>,
}

pub struct ApiRouterParts {
    pub gateway: Arc<CapabilityGateway>,
    pub realm: String,
    pub limiter: Arc<RateLimiter>,
    pub routes: Arc<RouteTable>,
    pub balancer: Arc<LoadBalancer>,
    pub dispatcher: Arc<Dispatcher>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub metrics: Arc<MeshMetrics>,
}

impl ApiRouter {
    pub fn new(p: ApiRouterParts) -> Self {
        Self {
            gateway: p.gateway,
            realm: p.realm,
            limiter: p.limiter,
            routes: p.routes,
            balancer: p.balancer,
            dispatcher: p.dispatcher,
            telemetry: p.telemetry,
            metrics: p.metrics,
        }
    }

    pub async fn route_request(&self, mut req: ApiRequest) -> ApiResponse {
        let request_id = req
            .request_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let started = Instant::now();

        let outcome = self.run(&req).await;
        let elapsed = started.elapsed();
        let micros = elapsed.as_micros() as u64;

        let (state, kind, resp) = match outcome {
            Ok((body, instance_id)) => (RouteState::Completed, None, ApiResponse::completed(body, instance_id, micros)),
            Err(e) => {
                let kind = e.kind();
                match kind {
                    ErrorKind::UpstreamFailure | ErrorKind::Internal => {
                        tracing::error!(request_id = %request_id, path = %req.path, error = %e, "request failed")
                    }
                    _ => tracing::warn!(request_id = %request_id, path = %req.path, error = %e, "request rejected"),
                }
                (RouteState::terminal_for(kind), Some(kind), ApiResponse::failed(&e, micros))
            }
        };

        let kind_label = kind.map(|k| k.as_str()).unwrap_or("none");
        self.metrics
            .route_requests
            .inc(&[("state", state.as_str()), ("kind", kind_label)]);
        self.metrics.route_duration.observe(&[("state", state.as_str())], elapsed);
        self.telemetry.record(&CompletionEvent {
            request_id,
            path: req.path,
            method: req.method,
            state,
            kind,
            status_code: resp.status_code,
            duration: elapsed,
        });

        resp
    }

    async fn run(&self, req: &ApiRequest) -> Result<(Value, String)> {
        if let Some(caller) = &req.caller {
            self.authorize(caller, req).await?;
            tracing::debug!(user = %caller.user_id, path = %req.path, state = RouteState::Authorized.as_str(), "stage passed");
        }

        if !self.limiter.is_exempt(&req.path) {
            let key = rate_key(req);
            let class = self.class_for(req);
            let policy = class.as_ref().map_or_else(|| self.limiter.default_policy(), |(_, p)| *p);
            let decision = self
                .limiter
                .check_in(class.as_ref().map(|(name, _)| name.as_str()), &key, policy)
                .await;
            if !decision.allowed {
                return Err(MeshError::RateLimited {
                    retry_after_secs: policy.window_secs,
                });
            }
            tracing::debug!(key = %key, remaining = decision.remaining, state = RouteState::RateChecked.as_str(), "stage passed");
        }

        let route = self
            .routes
            .lookup(&req.path, req.method)
            .ok_or_else(|| MeshError::NotFound(format!("no route for {} {}", req.method, req.path)))?;
        tracing::debug!(service = %route.service, state = RouteState::Routed.as_str(), "stage passed");

        let instance = self
            .balancer
            .select_instance(&route.service, route.strategy)
            .await
            .into_result()?;

        tracing::debug!(instance = %instance.id, state = RouteState::Dispatched.as_str(), "stage passed");
        let body = self.dispatcher.dispatch(&route.handler, &instance, req).await?;
        Ok((body, instance.id))
    }

    /// Realm flag, then the Security check, then tenant isolation when the
    /// caller names a tenant.
    async fn authorize(&self, caller: &CallerContext, req: &ApiRequest) -> Result<()> {
        if let Some(realm) = &caller.realm {
            if !self.gateway.realm_has(realm, RealmCapability::RouteRequests) {
                return Err(MeshError::PolicyDenied(format!("realm {realm} may not route requests")));
            }
        }

        let security = self.gateway.security(&self.realm).await?;
        let permitted = security
            .check_permissions(caller, &req.path, req.method.as_str())
            .await?;
        if !permitted {
            return Err(MeshError::PolicyDenied(format!(
                "user {} may not {} {}",
                caller.user_id, req.method, req.path
            )));
        }

        if let Some(tenant_id) = &caller.tenant_id {
            let tenants = self.gateway.tenant(&self.realm).await?;
            if !tenants.validate_tenant_access(tenant_id).await? {
                return Err(MeshError::PolicyDenied(format!("tenant {tenant_id} access denied")));
            }
        }
        Ok(())
    }

    /// The route's rate class when it names a configured one; `None` means
    /// the default bucket and policy.
    fn class_for(&self, req: &ApiRequest) -> Option<(String, WindowPolicy)> {
        let class = self.routes.rate_class(&req.path, req.method)?;
        let policy = self.limiter.class_policy(&class)?;
        Some((class, policy))
    }
}

/// User id first, then source address, then the shared global bucket.
pub fn rate_key(req: &ApiRequest) -> KeySpec {
    if let Some(c) = req.caller.as_ref().filter(|c| !c.user_id.is_empty()) {
        return KeySpec::User(c.user_id.clone());
    }
    match &req.source_addr {
        Some(addr) if !addr.is_empty() => KeySpec::Ip(addr.clone()),
        _ => KeySpec::Global,
    }
}
