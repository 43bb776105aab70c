//! Constitutive evaluation
//!
//! Materials work on fields in batch layout: one `(nmodes, npe * npe)` complex
//! matrix per component, rows indexing Fourier modes and columns the element
//! nodes in `i * npe + j` order. This is the layout the transform layer
//! consumes directly for 3-D material.

mod acoustic;
mod attenuation;
mod elastic;

pub use acoustic::*;
pub use attenuation::*;
pub use elastic::*;

use ndarray::Array2;
use num_complex::Complex64;

/// One component of a field, all modes, all nodes
pub type ModeField = Array2<Complex64>;
/// Voigt strain `[ss, φφ, zz, φz, sz, sφ]`
pub type StrainField = [ModeField; 6];
/// Voigt stress, same order as the strain
pub type StressField = [ModeField; 6];
