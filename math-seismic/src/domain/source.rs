//! Source terms: a fixed force pattern on one point scaled by a time function

use crate::point::DomainPoint;
use crate::stf::SourceTimeFunction;
use ndarray::Array2;
use num_complex::Complex64;

/// Point force on the symmetry axis
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// Height of the source on the axis
    pub z: f64,
    /// Force in Cartesian components (x, y, z), x along φ = 0
    pub force: [f64; 3],
    pub stf: SourceTimeFunction,
}

/// Force pattern per mode, added to one point every step
#[derive(Debug, Clone)]
pub struct SourceTerm {
    point: usize,
    pattern: Array2<Complex64>,
    stf: SourceTimeFunction,
}

impl SourceTerm {
    pub fn new(point: usize, pattern: Array2<Complex64>, stf: SourceTimeFunction) -> Self {
        Self {
            point,
            pattern,
            stf,
        }
    }

    /// Fourier pattern of a Cartesian force applied on the axis
    ///
    /// The vertical part lives in mode 0. The horizontal part lives in mode 1
    /// as `u_s = (F_x - i F_y) / 2`, `u_φ = i u_s`.
    pub fn axial_force_pattern(force: [f64; 3], nu: usize) -> Array2<Complex64> {
        let mut pattern = Array2::from_elem((nu + 1, 3), Complex64::new(0.0, 0.0));
        pattern[[0, 2]] = Complex64::new(force[2], 0.0);
        if nu >= 1 {
            let s = Complex64::new(force[0], -force[1]) * 0.5;
            pattern[[1, 0]] = s;
            pattern[[1, 1]] = Complex64::new(0.0, 1.0) * s;
        } else if force[0] != 0.0 || force[1] != 0.0 {
            log::warn!("Horizontal source force ignored: the source point carries mode 0 only");
        }
        pattern
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn stf(&self) -> &SourceTimeFunction {
        &self.stf
    }

    /// Add the pattern scaled by the time function at `step`
    pub fn apply(&self, step: usize, points: &mut [DomainPoint]) {
        let amp = self.stf.value(step);
        if amp == 0.0 {
            return;
        }
        if let Some(p) = points[self.point].solid_mut() {
            for (f, &s) in p.stiff.iter_mut().zip(self.pattern.iter()) {
                *f += s * amp;
            }
        }
    }
}
