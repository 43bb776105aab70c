//! Explicitly owned solver context
//!
//! Holds everything that is built once per process and shared read-only by
//! all elements: the GLL/GLJ bases, their differentiation operators in real
//! and complex form, and the Fourier plan cache.

use super::basis::NodalBasis;
use crate::error::{Result, SolverError};
use crate::transform::FourierPlans;
use ndarray::Array2;
use num_complex::Complex64;

/// Differentiation operators for one element kind, in one scalar type
///
/// `d_xi` acts from the left (rows index ξ), `d_eta_t` from the right
/// (columns index η). The transposes are the quadrature (adjoint) side.
#[derive(Debug, Clone)]
pub struct Operators<T> {
    pub d_xi: Array2<T>,
    pub d_xi_t: Array2<T>,
    pub d_eta: Array2<T>,
    pub d_eta_t: Array2<T>,
}

impl Operators<f64> {
    fn new(xi: &NodalBasis, eta: &NodalBasis) -> Self {
        Self {
            d_xi: xi.diff.clone(),
            d_xi_t: xi.diff.t().to_owned(),
            d_eta: eta.diff.clone(),
            d_eta_t: eta.diff.t().to_owned(),
        }
    }

    fn to_complex(&self) -> Operators<Complex64> {
        let c = |m: &Array2<f64>| m.mapv(|x| Complex64::new(x, 0.0));
        Operators {
            d_xi: c(&self.d_xi),
            d_xi_t: c(&self.d_xi_t),
            d_eta: c(&self.d_eta),
            d_eta_t: c(&self.d_eta_t),
        }
    }
}

/// Real operators for the mode-0 path and complex ones for modes > 0
#[derive(Debug, Clone)]
pub struct DiffOperators {
    pub real: Operators<f64>,
    pub complex: Operators<Complex64>,
}

impl DiffOperators {
    fn new(xi: &NodalBasis, eta: &NodalBasis) -> Self {
        let real = Operators::new(xi, eta);
        let complex = real.to_complex();
        Self { real, complex }
    }
}

/// Per-process context shared by every element
#[derive(Debug)]
pub struct SpectralContext {
    npol: usize,
    /// GLL basis (η always, ξ for ordinary elements)
    pub gll: NodalBasis,
    /// GLJ basis (ξ of axial elements)
    pub glj: NodalBasis,
    /// Operators of elements touching the axis
    pub axial: DiffOperators,
    /// Operators of all other elements
    pub nonaxial: DiffOperators,
    /// Fourier plan cache
    pub plans: FourierPlans,
}

impl SpectralContext {
    /// Build bases, operators and plans for orders up to `max_nr` samples
    pub fn init(npol: usize, max_nr: usize) -> Result<Self> {
        if !(super::MIN_NPOL..=super::MAX_NPOL).contains(&npol) {
            return Err(SolverError::Config(format!(
                "npol = {} outside supported range {}..={}",
                npol,
                super::MIN_NPOL,
                super::MAX_NPOL
            )));
        }
        if max_nr == 0 {
            return Err(SolverError::Config("max_nr must be at least 1".into()));
        }

        let gll = NodalBasis::gll(npol);
        let glj = NodalBasis::glj(npol);
        let axial = DiffOperators::new(&glj, &gll);
        let nonaxial = DiffOperators::new(&gll, &gll);
        let plans = FourierPlans::initialize(max_nr);

        log::debug!(
            "Spectral context: npol = {}, {} transform plans",
            npol,
            plans.max_nr()
        );

        Ok(Self {
            npol,
            gll,
            glj,
            axial,
            nonaxial,
            plans,
        })
    }

    /// Release the transform plans; the context cannot transform afterwards
    pub fn teardown(&mut self) {
        self.plans.finalize();
    }

    pub fn npol(&self) -> usize {
        self.npol
    }

    /// Nodes per element direction
    pub fn npe(&self) -> usize {
        self.npol + 1
    }

    /// Basis along ξ for an element
    pub fn xi_basis(&self, axial: bool) -> &NodalBasis {
        if axial { &self.glj } else { &self.gll }
    }

    /// Differentiation operators for an element
    pub fn operators(&self, axial: bool) -> &DiffOperators {
        if axial { &self.axial } else { &self.nonaxial }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lifecycle() {
        let mut ctx = SpectralContext::init(4, 8).unwrap();
        assert_eq!(ctx.npe(), 5);
        assert_eq!(ctx.plans.max_nr(), 8);
        ctx.teardown();
        assert_eq!(ctx.plans.max_nr(), 0);
    }

    #[test]
    fn test_rejects_bad_order() {
        assert!(SpectralContext::init(1, 4).is_err());
        assert!(SpectralContext::init(12, 4).is_err());
        assert!(SpectralContext::init(4, 0).is_err());
    }

    #[test]
    fn test_operator_transposes() {
        let ctx = SpectralContext::init(3, 2).unwrap();
        let ops = &ctx.axial.real;
        assert_eq!(ops.d_xi.t(), ops.d_xi_t);
        assert_eq!(ctx.axial.complex.d_eta[[1, 2]].re, ops.d_eta[[1, 2]]);
    }
}
