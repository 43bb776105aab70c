//! The distributed domain
//!
//! - `builder`: global numbering, mass, interfaces and partition setup
//! - `state`: the per-rank operations of one time step
//! - `source`, `station`: forcing and recording
//! - `policy`: choice of the azimuthal resolution per element
//! - `cost`: time-loop timers and load measurement

mod builder;
mod cost;
mod policy;
mod source;
mod state;
mod station;

pub use builder::*;
pub use cost::*;
pub use policy::*;
pub use source::*;
pub use state::*;
pub use station::*;
