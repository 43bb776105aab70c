//! Spectral-element building blocks
//!
//! Collocation bases, differentiation operators and the per-process
//! [`SpectralContext`] that owns them together with the Fourier plans.

mod basis;
mod context;
mod quadrature;

pub use basis::*;
pub use context::*;
pub use quadrature::*;
