//! Spectral elements in the meridian plane
//!
//! - `geometry`: bilinear element maps and per-node geometric factors
//! - `gradient`: the strain operator and its quadrature adjoint
//! - `spectral_element`: the per-element force computation

mod geometry;
mod gradient;
mod spectral_element;

pub use geometry::*;
pub use gradient::*;
pub use spectral_element::*;
