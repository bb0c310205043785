//! Policy layer (realm allow-lists, capability gateway, rate limiting).
//!
//! Compiles realm configuration into immutable lookup structures and wraps
//! the Infrastructure Provider behind a single enforcement point.

pub mod allowlist;
pub mod gateway;
pub mod limiter;

pub use allowlist::{Realm, RealmMap};
pub use gateway::{AccessLedger, AccessRecord, CapabilityGateway, GatewayHealth};
pub use limiter::RateLimiter;
