//! Dispatcher module exports.
//!
//! Re-exports the handler registry and the handler trait so downstream
//! consumers can depend on this module directly.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, ServiceHandler};
