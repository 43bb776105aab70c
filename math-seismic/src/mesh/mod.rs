//! Mesh description and structured generators
//!
//! The mesh is the same on every rank; partitioning only decides which
//! elements a rank computes.

mod generators;
mod types;

pub use generators::*;
pub use types::*;
