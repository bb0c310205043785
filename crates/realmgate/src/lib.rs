//! Top-level facade crate for realmgate.
//!
//! Re-exports core types and the mesh control plane so users can depend on a single crate.

pub mod core {
    pub use realmgate_core::*;
}

pub mod mesh {
    pub use realmgate_mesh::*;
}
