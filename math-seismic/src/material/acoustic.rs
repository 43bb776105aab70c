//! Acoustic law of fluid elements
//!
//! The fluid is described by a displacement potential χ; the "stress" of the
//! potential formulation is the gradient scaled by 1/ρ.

use super::ModeField;
use crate::error::{Result, TransformError};
use crate::transform::{FourierPlans, mask_nyquist};
use ndarray::{Array2, ArrayView1, Zip};

/// Gradient components `[∂/∂s, (iα/s)·, ∂/∂z]` per mode, shape (nmodes, npe²)
pub type GradField = [ModeField; 3];

/// Fluid material of one element: 1/ρ per node, pre-multiplied by the
/// integration factor, shape `(nsamples, npe * npe)`
#[derive(Debug, Clone)]
pub struct Acoustic {
    pub inv_rho: Array2<f64>,
}

impl Acoustic {
    pub fn new(inv_rho: Array2<f64>) -> Self {
        Self { inv_rho }
    }

    pub fn nsamples(&self) -> usize {
        self.inv_rho.nrows()
    }

    pub fn is_3d(&self) -> bool {
        self.nsamples() > 1
    }

    pub fn scaled(mut self, integral: ArrayView1<f64>) -> Self {
        for mut row in self.inv_rho.rows_mut() {
            Zip::from(&mut row).and(&integral).for_each(|x, &w| *x *= w);
        }
        self
    }

    pub fn check_compatibility(&self, nr: usize, plans: &FourierPlans) -> std::result::Result<(), String> {
        if self.is_3d() && self.nsamples() != nr {
            return Err(format!(
                "3-D fluid sampled at {} azimuths on an element with nr = {}",
                self.nsamples(),
                nr
            ));
        }
        if nr > plans.max_nr() {
            return Err(format!("nr = {} exceeds the transform plan cache (max {})", nr, plans.max_nr()));
        }
        Ok(())
    }

    pub fn stress(&self, grad: &GradField, nr: usize, plans: &FourierPlans) -> Result<GradField> {
        if !self.is_3d() {
            let k = self.inv_rho.row(0);
            return Ok(std::array::from_fn(|c| {
                let mut out = grad[c].clone();
                for mut row in out.rows_mut() {
                    Zip::from(&mut row).and(&k).for_each(|x, &w| *x *= w);
                }
                out
            }));
        }

        let mut out: GradField = std::array::from_fn(|_| ModeField::zeros((0, 0)));
        for (o, g) in out.iter_mut().zip(grad) {
            let mut physical = plans.c2r(nr, g)?;
            if physical.dim() != self.inv_rho.dim() {
                return Err(TransformError::ShapeMismatch {
                    expected: physical.dim(),
                    actual: self.inv_rho.dim(),
                }
                .into());
            }
            physical *= &self.inv_rho;
            *o = plans.r2c(nr, &physical)?;
            mask_nyquist(o, nr);
        }
        Ok(out)
    }
}
