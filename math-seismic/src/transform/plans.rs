//! Real-to-complex transform plans keyed by sample count
//!
//! Small sample counts keep their twiddle tables as dense matrices, so that a
//! batch of columns is transformed with two matrix products. From
//! [`FFT_CUTOFF`] samples on, plans are real FFTs applied column by column.

use crate::error::TransformError;
use ndarray::{Array2, Zip, s};
use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Smallest sample count transformed by FFT instead of dense products
pub const FFT_CUTOFF: usize = 64;

/// Number of Fourier modes (including mode 0) for `nr` physical samples
#[inline]
pub fn num_modes(nr: usize) -> usize {
    nr / 2 + 1
}

/// Whether `nr` carries a Nyquist mode
#[inline]
pub fn has_nyquist(nr: usize) -> bool {
    nr % 2 == 0
}

/// Transform of one sample count
#[derive(Clone)]
enum Plan {
    Dense {
        /// Forward, real part: cos(θ_mk) / nr, shape (nc, nr)
        fwd_re: Array2<f64>,
        /// Forward, imaginary part: -sin(θ_mk) / nr
        fwd_im: Array2<f64>,
        /// Inverse, applied to real parts: w_m cos(θ_km), shape (nr, nc)
        inv_re: Array2<f64>,
        /// Inverse, applied to imaginary parts: -w_m sin(θ_km)
        inv_im: Array2<f64>,
    },
    Fft {
        forward: Arc<dyn RealToComplex<f64>>,
        inverse: Arc<dyn ComplexToReal<f64>>,
    },
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Dense { fwd_re, .. } => write!(f, "Plan::Dense(nr = {})", fwd_re.ncols()),
            Plan::Fft { forward, .. } => write!(f, "Plan::Fft(nr = {})", forward.len()),
        }
    }
}

impl Plan {
    fn dense(nr: usize) -> Self {
        let nc = num_modes(nr);
        let inv_nr = 1.0 / nr as f64;
        let mut fwd_re = Array2::zeros((nc, nr));
        let mut fwd_im = Array2::zeros((nc, nr));
        let mut inv_re = Array2::zeros((nr, nc));
        let mut inv_im = Array2::zeros((nr, nc));

        for m in 0..nc {
            // conjugate-symmetric partners counted twice, except mode 0 and Nyquist
            let w = if m == 0 || (has_nyquist(nr) && m == nr / 2) {
                1.0
            } else {
                2.0
            };
            for k in 0..nr {
                let theta = 2.0 * PI * ((m * k) % nr) as f64 / nr as f64;
                let (sin, cos) = theta.sin_cos();
                fwd_re[[m, k]] = cos * inv_nr;
                fwd_im[[m, k]] = -sin * inv_nr;
                inv_re[[k, m]] = w * cos;
                inv_im[[k, m]] = -w * sin;
            }
        }

        Plan::Dense {
            fwd_re,
            fwd_im,
            inv_re,
            inv_im,
        }
    }

    fn fft(nr: usize, planner: &mut RealFftPlanner<f64>) -> Self {
        Plan::Fft {
            forward: planner.plan_fft_forward(nr),
            inverse: planner.plan_fft_inverse(nr),
        }
    }

    fn r2c(&self, nr: usize, physical: &Array2<f64>) -> Result<Array2<Complex64>, TransformError> {
        match self {
            Plan::Dense { fwd_re, fwd_im, .. } => {
                let re = fwd_re.dot(physical);
                let im = fwd_im.dot(physical);
                let mut out = Array2::zeros(re.dim());
                Zip::from(&mut out)
                    .and(&re)
                    .and(&im)
                    .for_each(|o, &r, &i| *o = Complex64::new(r, i));
                Ok(out)
            }
            Plan::Fft { forward, .. } => {
                let inv_nr = 1.0 / nr as f64;
                let mut out = Array2::zeros((num_modes(nr), physical.ncols()));
                let mut input = forward.make_input_vec();
                let mut spectrum = forward.make_output_vec();
                for (col, mut dst) in physical.columns().into_iter().zip(out.columns_mut()) {
                    for (x, &v) in input.iter_mut().zip(col.iter()) {
                        *x = v;
                    }
                    forward
                        .process(&mut input, &mut spectrum)
                        .map_err(|e| TransformError::Fft {
                            nr,
                            reason: e.to_string(),
                        })?;
                    for (d, &c) in dst.iter_mut().zip(&spectrum) {
                        *d = c * inv_nr;
                    }
                }
                Ok(out)
            }
        }
    }

    fn c2r(&self, nr: usize, spectral: &Array2<Complex64>) -> Result<Array2<f64>, TransformError> {
        match self {
            Plan::Dense { inv_re, inv_im, .. } => {
                let re = spectral.mapv(|c| c.re);
                let im = spectral.mapv(|c| c.im);
                Ok(inv_re.dot(&re) + inv_im.dot(&im))
            }
            Plan::Fft { inverse, .. } => {
                let nc = num_modes(nr);
                let mut out = Array2::zeros((nr, spectral.ncols()));
                let mut spectrum = inverse.make_input_vec();
                let mut output = inverse.make_output_vec();
                for (col, mut dst) in spectral.columns().into_iter().zip(out.columns_mut()) {
                    for (x, &c) in spectrum.iter_mut().zip(col.iter()) {
                        *x = c;
                    }
                    // real-valued by construction
                    spectrum[0].im = 0.0;
                    if has_nyquist(nr) {
                        spectrum[nc - 1].im = 0.0;
                    }
                    inverse
                        .process(&mut spectrum, &mut output)
                        .map_err(|e| TransformError::Fft {
                            nr,
                            reason: e.to_string(),
                        })?;
                    for (d, &v) in dst.iter_mut().zip(&output) {
                        *d = v;
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Cache of transform plans for `nr = 1..=max_nr`
#[derive(Debug, Clone, Default)]
pub struct FourierPlans {
    plans: Vec<Plan>,
}

impl FourierPlans {
    /// Build plans for every sample count up to `max_nr`
    pub fn initialize(max_nr: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        Self {
            plans: (1..=max_nr)
                .map(|nr| {
                    if nr < FFT_CUTOFF {
                        Plan::dense(nr)
                    } else {
                        Plan::fft(nr, &mut planner)
                    }
                })
                .collect(),
        }
    }

    /// Release all plans
    pub fn finalize(&mut self) {
        self.plans.clear();
    }

    /// Largest planned sample count (0 after finalize)
    pub fn max_nr(&self) -> usize {
        self.plans.len()
    }

    fn plan(&self, nr: usize) -> Result<&Plan, TransformError> {
        if nr == 0 || nr > self.plans.len() {
            return Err(TransformError::NoPlan {
                nr,
                max_nr: self.plans.len(),
            });
        }
        Ok(&self.plans[nr - 1])
    }

    /// Physical samples (nr × batch) to Fourier coefficients (nr/2+1 × batch)
    ///
    /// Normalised by 1/nr so that [`FourierPlans::c2r`] inverts it exactly.
    pub fn r2c(
        &self,
        nr: usize,
        physical: &Array2<f64>,
    ) -> Result<Array2<Complex64>, TransformError> {
        let plan = self.plan(nr)?;
        if physical.nrows() != nr {
            return Err(TransformError::ShapeMismatch {
                expected: (nr, physical.ncols()),
                actual: physical.dim(),
            });
        }
        plan.r2c(nr, physical)
    }

    /// Fourier coefficients (nr/2+1 × batch) to physical samples (nr × batch)
    ///
    /// Imaginary parts of mode 0 and of the Nyquist mode do not contribute.
    pub fn c2r(
        &self,
        nr: usize,
        spectral: &Array2<Complex64>,
    ) -> Result<Array2<f64>, TransformError> {
        let plan = self.plan(nr)?;
        if spectral.nrows() != num_modes(nr) {
            return Err(TransformError::ShapeMismatch {
                expected: (num_modes(nr), spectral.ncols()),
                actual: spectral.dim(),
            });
        }
        plan.c2r(nr, spectral)
    }
}

/// Zero the Nyquist row of a coefficient block for even `nr`
pub fn mask_nyquist(spectral: &mut Array2<Complex64>, nr: usize) {
    if has_nyquist(nr) && spectral.nrows() == num_modes(nr) {
        spectral
            .slice_mut(s![nr / 2, ..])
            .fill(Complex64::new(0.0, 0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_round_trip_all_sample_counts() {
        let max_nr = 24;
        let plans = FourierPlans::initialize(max_nr);
        let mut rng = StdRng::seed_from_u64(7);
        for nr in 1..=max_nr {
            let f = Array2::from_shape_fn((nr, 5), |_| rng.random_range(-1.0..1.0));
            let c = plans.r2c(nr, &f).unwrap();
            assert_eq!(c.nrows(), num_modes(nr));
            let back = plans.c2r(nr, &c).unwrap();
            for (a, b) in f.iter().zip(back.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_fft_plans_match_dense_tables() {
        let mut planner = RealFftPlanner::new();
        let mut rng = StdRng::seed_from_u64(11);
        for nr in [FFT_CUTOFF, 65, 96, 127] {
            let (dense, fft) = (Plan::dense(nr), Plan::fft(nr, &mut planner));
            let f = Array2::from_shape_fn((nr, 3), |_| rng.random_range(-1.0..1.0));
            let a = dense.r2c(nr, &f).unwrap();
            let b = fft.r2c(nr, &f).unwrap();
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).norm() < 1e-12, "nr = {}: {} vs {}", nr, x, y);
            }
            let back_dense = dense.c2r(nr, &a).unwrap();
            let back_fft = fft.c2r(nr, &b).unwrap();
            for ((x, y), z) in back_dense.iter().zip(back_fft.iter()).zip(f.iter()) {
                assert_relative_eq!(*x, *z, epsilon = 1e-10);
                assert_relative_eq!(*y, *z, epsilon = 1e-10);
            }
        }

        let plans = FourierPlans::initialize(FFT_CUTOFF + 1);
        assert!(matches!(plans.plan(FFT_CUTOFF - 1), Ok(Plan::Dense { .. })));
        assert!(matches!(plans.plan(FFT_CUTOFF), Ok(Plan::Fft { .. })));
    }

    #[test]
    fn test_single_cosine_lands_in_one_mode() {
        let nr = 9;
        let plans = FourierPlans::initialize(nr);
        let f = Array2::from_shape_fn((nr, 1), |(k, _)| {
            (2.0 * PI * 2.0 * k as f64 / nr as f64).cos()
        });
        let c = plans.r2c(nr, &f).unwrap();
        assert_relative_eq!(c[[2, 0]].re, 0.5, epsilon = 1e-13);
        for m in [0, 1, 3, 4] {
            assert!(c[[m, 0]].norm() < 1e-13);
        }
    }

    #[test]
    fn test_nyquist_mask() {
        let nr = 6;
        let plans = FourierPlans::initialize(nr);
        let f = Array2::from_shape_fn((nr, 2), |(k, _)| if k % 2 == 0 { 1.0 } else { -1.0 });
        let mut c = plans.r2c(nr, &f).unwrap();
        assert_relative_eq!(c[[3, 0]].re, 1.0, epsilon = 1e-13);
        mask_nyquist(&mut c, nr);
        assert_eq!(c[[3, 0]], Complex64::new(0.0, 0.0));
        assert_eq!(c[[3, 1]], Complex64::new(0.0, 0.0));

        // odd counts have no Nyquist row to mask
        let mut odd = Array2::from_elem((3, 1), Complex64::new(1.0, 0.0));
        mask_nyquist(&mut odd, 5);
        assert_eq!(odd[[2, 0]], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_missing_plan() {
        let mut plans = FourierPlans::initialize(4);
        let f = Array2::zeros((5, 1));
        assert_eq!(
            plans.r2c(5, &f).unwrap_err(),
            TransformError::NoPlan { nr: 5, max_nr: 4 }
        );
        plans.finalize();
        assert!(plans.c2r(1, &Array2::zeros((1, 1))).is_err());
    }
}
