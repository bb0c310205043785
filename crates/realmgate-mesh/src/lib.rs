//! realmgate mesh library entry.
//!
//! This crate wires the capability gateway, rate limiter, load balancer,
//! route table, API router and state synchronizer into one control plane.
//! It is intended to be consumed by the binary (`main.rs`), by business
//! services calling the control plane in-process, and by integration tests.

pub mod balance;
pub mod capability;
pub mod config;
pub mod control_plane;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod routing;
pub mod services;
pub mod sync;

pub use control_plane::{ControlPlane, ControlPlaneBuilder};
