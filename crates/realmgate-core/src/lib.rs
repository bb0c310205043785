//! realmgate core: transport-agnostic primitives, error types, and envelopes.
//!
//! This crate defines the contracts shared by the mesh control plane and the
//! business services that call it: the closed error taxonomy, the uniform
//! response envelope, request/response shapes, rate-limit keys, and state
//! sync records. It carries no runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MeshError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod envelope;
pub mod error;
pub mod protocol;

pub use envelope::{Envelope, ErrorBody};
/// Shared result type.
pub use error::{ErrorKind, MeshError, Result};
