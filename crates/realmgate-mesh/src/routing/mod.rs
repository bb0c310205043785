//! Route table and the API router pipeline.

pub mod router;
pub mod table;

pub use router::{rate_key, ApiRouter, ApiRouterParts};
pub use table::{Route, RouteTable};
