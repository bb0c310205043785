use dashmap::DashMap;
use serde::Serialize;

use realmgate_core::protocol::{Method, Strategy};

use crate::config::RouteConfig;

/// (path, method) -> target service plus dispatch metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub path: String,
    pub method: Method,
    pub service: String,
    pub handler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_class: Option<String>,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            service: service.into(),
            handler: "echo".into(),
            rate_class: None,
            strategy: Strategy::default(),
            description: None,
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn with_rate_class(mut self, class: impl Into<String>) -> Self {
        self.rate_class = Some(class.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl From<&RouteConfig> for Route {
    fn from(c: &RouteConfig) -> Self {
        Self {
            path: c.path.clone(),
            method: c.method,
            service: c.service.clone(),
            handler: c.handler.clone(),
            rate_class: c.rate_class.clone(),
            strategy: c.strategy,
            description: c.description.clone(),
        }
    }
}

/// Registered at startup, read-only afterwards. O(1) lookup by (path, method).
#[derive(Default)]
pub struct RouteTable {
    routes: DashMap<(String, Method), Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let table = Self::new();
        for r in routes {
            table.register_route(r.into());
        }
        table
    }

    /// Last registration for a (path, method) wins. Returns the replaced route.
    pub fn register_route(&self, route: Route) -> Option<Route> {
        let key = (route.path.clone(), route.method);
        tracing::info!(method = %route.method, path = %route.path, service = %route.service, "route registered");
        let prev = self.routes.insert(key, route);
        if let Some(p) = &prev {
            tracing::warn!(method = %p.method, path = %p.path, service = %p.service, "route replaced");
        }
        prev
    }

    pub fn lookup(&self, path: &str, method: Method) -> Option<Route> {
        self.routes
            .get(&(path.to_string(), method))
            .map(|r| r.value().clone())
    }

    /// Rate-limit class attached to a route, if any.
    pub fn rate_class(&self, path: &str, method: Method) -> Option<String> {
        self.routes
            .get(&(path.to_string(), method))
            .and_then(|r| r.rate_class.clone())
    }

    /// Snapshot ordered by (path, method).
    pub fn list_routes(&self) -> Vec<Route> {
        let mut out: Vec<Route> = self.routes.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| (&a.path, a.method).cmp(&(&b.path, b.method)));
        out
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
