//! Protocol types shared by the control plane and its callers.
//!
//! - `api`: router requests/responses, methods, caller context
//! - `kinds`: closed abstraction set and realm capability flags
//! - `ratelimit`: key specs and admission decisions
//! - `service`: discovered instances and selection strategies
//! - `sync`: state synchronization records and monotonic status
//!
//! None of these types carry transport or runtime dependencies.

pub mod api;
pub mod kinds;
pub mod ratelimit;
pub mod service;
pub mod sync;

pub use api::{ApiRequest, ApiResponse, CallerContext, Method};
pub use kinds::{AbstractionKind, RealmCapability};
pub use ratelimit::{KeySpec, RateLimitDecision, WindowPolicy};
pub use service::{ServiceInstance, Strategy};
pub use sync::{SyncPriority, SyncReceipt, SyncRecord, SyncRequest, SyncStatus, SyncType};
