//! Azimuthal Fourier transforms
//!
//! Converts element fields between `nr` physical azimuth samples and the
//! truncated Fourier representation of `nr / 2 + 1` modes. Plans are built
//! once for every sample count up to a maximum and reused for all elements.

mod plans;

pub use plans::*;
