//! Shared control-plane state and the operations exposed to business
//! services and the ops surface.
//!
//! Every operation here returns an `Envelope` (or the envelope-shaped
//! `ApiResponse`); errors never escape as bare `MeshError`s.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use realmgate_core::error::{MeshError, Result};
use realmgate_core::protocol::{
    ApiRequest, ApiResponse, KeySpec, RateLimitDecision, ServiceInstance, Strategy, SyncReceipt, SyncRequest,
    WindowPolicy,
};
use realmgate_core::Envelope;

use crate::balance::LoadBalancer;
use crate::capability::memory::StaticDiscovery;
use crate::capability::{InfrastructureProvider, ServiceDiscovery};
use crate::config::MeshConfig;
use crate::dispatch::{Dispatcher, ServiceHandler};
use crate::obs::{MeshMetrics, TelemetrySink, TracingTelemetry};
use crate::policy::{AccessRecord, CapabilityGateway, GatewayHealth, RateLimiter, RealmMap};
use crate::routing::{ApiRouter, ApiRouterParts, Route, RouteTable};
use crate::services::EchoHandler;
use crate::sync::StateSynchronizer;

#[derive(Debug, Clone, Serialize)]
pub struct ResetReceipt {
    pub key: String,
    pub reset: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessCheck {
    pub realm: String,
    pub abstraction: String,
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessMetrics {
    pub realms: BTreeMap<String, BTreeMap<String, AccessRecord>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteListing {
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub gateway: GatewayHealth,
    pub routes: usize,
    pub handlers: Vec<&'static str>,
    pub draining: bool,
}

pub struct ControlPlaneBuilder {
    cfg: MeshConfig,
    provider: Option<Arc<dyn InfrastructureProvider>>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    handlers: Vec<Arc<dyn ServiceHandler>>,
}

impl ControlPlaneBuilder {
    pub fn provider(mut self, provider: Arc<dyn InfrastructureProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Defaults to a `StaticDiscovery` seeded from `services` in the config.
    pub fn discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn ServiceHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Fails on invalid config or when no provider was supplied.
    pub fn build(self) -> Result<ControlPlane> {
        let cfg = self.cfg;
        cfg.validate()?;

        let metrics = Arc::new(MeshMetrics::default());
        let realms = RealmMap::compile(&cfg.realms)?;
        let gateway = Arc::new(CapabilityGateway::initialize(realms, self.provider, Arc::clone(&metrics))?);
        let control_realm = cfg.gateway.control_realm.clone();

        let dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(EchoHandler::new()));
        for h in self.handlers {
            dispatcher.register(h);
        }

        let routes = RouteTable::from_config(&cfg.routes);
        for r in routes.list_routes() {
            if !dispatcher.contains(&r.handler) {
                tracing::warn!(method = %r.method, path = %r.path, handler = %r.handler, "route refers to unregistered handler");
            }
        }

        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(StaticDiscovery::from_config(&cfg.services)));
        let telemetry = self.telemetry.unwrap_or_else(|| Arc::new(TracingTelemetry));

        let limiter = Arc::new(RateLimiter::new(
            Arc::clone(&gateway),
            control_realm.clone(),
            &cfg.rate_limit,
            Arc::clone(&metrics),
        ));
        let balancer = Arc::new(LoadBalancer::new(discovery, Arc::clone(&metrics)));
        let routes = Arc::new(routes);
        let dispatcher = Arc::new(dispatcher);

        let router = ApiRouter::new(ApiRouterParts {
            gateway: Arc::clone(&gateway),
            realm: control_realm.clone(),
            limiter: Arc::clone(&limiter),
            routes: Arc::clone(&routes),
            balancer: Arc::clone(&balancer),
            dispatcher: Arc::clone(&dispatcher),
            telemetry,
            metrics: Arc::clone(&metrics),
        });
        let sync = StateSynchronizer::new(Arc::clone(&gateway), control_realm, Arc::clone(&metrics));

        tracing::info!(
            realms = cfg.realms.len(),
            routes = routes.len(),
            handlers = dispatcher.registered().len(),
            "control plane ready"
        );

        Ok(ControlPlane {
            inner: Arc::new(Inner {
                cfg,
                gateway,
                limiter,
                balancer,
                routes,
                dispatcher,
                router,
                sync,
                metrics,
            }),
        })
    }
}

#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: MeshConfig,
    gateway: Arc<CapabilityGateway>,
    limiter: Arc<RateLimiter>,
    balancer: Arc<LoadBalancer>,
    routes: Arc<RouteTable>,
    dispatcher: Arc<Dispatcher>,
    router: ApiRouter,
    sync: StateSynchronizer,
    metrics: Arc<MeshMetrics>,
}

impl ControlPlane {
    pub fn builder(cfg: MeshConfig) -> ControlPlaneBuilder {
        ControlPlaneBuilder {
            cfg,
            provider: None,
            discovery: None,
            telemetry: None,
            handlers: Vec::new(),
        }
    }

    pub fn cfg(&self) -> &MeshConfig {
        &self.inner.cfg
    }

    pub fn gateway(&self) -> Arc<CapabilityGateway> {
        Arc::clone(&self.inner.gateway)
    }

    pub fn metrics(&self) -> Arc<MeshMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub async fn route_api_request(&self, req: ApiRequest) -> ApiResponse {
        self.inner.router.route_request(req).await
    }

    /// Check against the configured default window.
    pub async fn check_rate_limit(&self, key: KeySpec) -> Envelope<RateLimitDecision> {
        let policy = self.inner.limiter.default_policy();
        self.check_rate_limit_with(key, policy).await
    }

    pub async fn check_rate_limit_with(&self, key: KeySpec, policy: WindowPolicy) -> Envelope<RateLimitDecision> {
        let decision = self.inner.limiter.check(&key, policy).await;
        if decision.allowed {
            Envelope::ok(decision)
        } else {
            let err = MeshError::RateLimited {
                retry_after_secs: policy.window_secs,
            };
            Envelope::fail_with(decision, &err)
        }
    }

    /// Clears the endpoint key when one is given, otherwise the user key.
    pub async fn reset_rate_limit(&self, user_id: &str, api_endpoint: Option<&str>) -> Envelope<ResetReceipt> {
        let key = match api_endpoint {
            Some(path) => KeySpec::Api(path.to_string()),
            None => KeySpec::User(user_id.to_string()),
        };
        match self.inner.limiter.reset(&key).await {
            Ok(()) => Envelope::ok(ResetReceipt {
                key: key.to_string(),
                reset: true,
            }),
            Err(e) => Envelope::fail_with(
                ResetReceipt {
                    key: key.to_string(),
                    reset: false,
                },
                &e,
            ),
        }
    }

    pub async fn select_service(&self, service: &str, strategy: Strategy) -> Envelope<ServiceInstance> {
        self.inner
            .balancer
            .select_instance(service, strategy)
            .await
            .into_result()
            .into()
    }

    pub async fn sync_state(&self, req: SyncRequest) -> Envelope<SyncReceipt> {
        self.inner.sync.sync_state(req).await
    }

    pub async fn get_sync_status(&self, sync_id: &str) -> Envelope<SyncReceipt> {
        self.inner.sync.get_sync_status(sync_id).await
    }

    pub fn get_access_metrics(&self) -> Envelope<AccessMetrics> {
        Envelope::ok(AccessMetrics {
            realms: self.inner.gateway.get_access_metrics(),
        })
    }

    pub fn validate_realm_access(&self, realm: &str, abstraction: &str) -> Envelope<AccessCheck> {
        Envelope::ok(AccessCheck {
            realm: realm.to_string(),
            abstraction: abstraction.to_string(),
            allowed: self.inner.gateway.validate_access_name(realm, abstraction),
        })
    }

    pub fn register_route(&self, route: Route) {
        self.inner.routes.register_route(route);
    }

    pub fn list_routes(&self) -> Envelope<RouteListing> {
        Envelope::ok(RouteListing {
            routes: self.inner.routes.list_routes(),
        })
    }

    pub fn health_check(&self) -> Envelope<HealthReport> {
        let gateway = self.inner.gateway.health_check();
        let draining = self.is_draining();
        let status = if draining {
            "draining"
        } else {
            gateway.status
        };
        Envelope::ok(HealthReport {
            status,
            gateway,
            routes: self.inner.routes.len(),
            handlers: self.inner.dispatcher.registered(),
            draining,
        })
    }
}
