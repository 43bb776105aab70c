//! Axisymmetric spectral-element solver for seismic wave propagation
//!
//! The Earth model is discretised with spectral elements in the meridian
//! (s, z) plane and with a truncated Fourier series in azimuth φ. Each element
//! carries its own number of azimuth samples `nr`, so smooth regions stay
//! cheap while 3-D structure gets the resolution it needs.
//!
//! - **Spectral**: GLL/GLJ bases, differentiation operators, Fourier plans
//! - **Element**: strain operator, constitutive laws, elemental forces
//! - **Domain**: global assembly across partitions, solid-fluid coupling
//! - **Time loop**: explicit Newmark with stability checks and recording
//!
//! # Example
//!
//! ```ignore
//! use math_seismic::{DomainBuilder, MaterialSpec, Newmark, SerialComm, SpectralContext};
//! use std::sync::Arc;
//!
//! let mesh = math_seismic::mesh::rectangular_meridian(1.0e3, -1.0e3, 0.0, 4, 4, rock, 1);
//! let ctx = Arc::new(SpectralContext::init(4, 1)?);
//! let dt = 0.5 * math_seismic::estimate_dt(&mesh, &ctx)?;
//! let mut domain = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm))?;
//! Newmark::new(dt, 1000).solve(&mut domain)?;
//! ```

pub mod comm;
pub mod config;
pub mod domain;
pub mod element;
pub mod error;
pub mod material;
pub mod mesh;
pub mod newmark;
pub mod point;
pub mod spectral;
pub mod stf;
pub mod transform;

pub use comm::{Communicator, ReduceOp, SerialComm, ThreadComm, ThreadGroup};
pub use config::SolverConfig;
pub use domain::{
    Domain, DomainBuilder, MemorySink, MeshNr, ModeTruncation, SourceSpec, StationSink,
    StationSpec, UniformNr, estimate_dt,
};
pub use error::{CommError, Result, SolverError, TransformError};
pub use mesh::{MaterialSpec, MeshData};
pub use newmark::Newmark;
pub use spectral::SpectralContext;
pub use stf::{SourceTimeFunction, StfKind};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
