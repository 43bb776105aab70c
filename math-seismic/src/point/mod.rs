//! Global points and their time integration
//!
//! Points are the unit of assembly: every element contributes forces to the
//! points it touches, and the Newmark update runs point by point.

mod domain_point;
mod nodal;
mod solid_fluid;

pub use domain_point::*;
pub use nodal::*;
pub use solid_fluid::*;
