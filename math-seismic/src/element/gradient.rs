//! Elemental gradient and its quadrature adjoint
//!
//! Both operators act mode by mode on fields stored as (npe × npe) matrices
//! indexed [ξ, η]. Derivatives along ξ are left products with the 1-D
//! differentiation matrix, derivatives along η right products; the map to
//! physical (s, z) derivatives is a Hadamard product with precomputed factors.
//!
//! Strain uses Voigt order `[ss, φφ, zz, φz, sz, sφ]` with engineering shear.
//! For azimuthal order α the φ-derivative becomes a multiplication by iα,
//! which couples the three displacement components through
//!
//! ```text
//! v0 = u_s + iα u_φ,   v1 = iα u_s − u_φ,   v2 = iα u_z
//! ```
//!
//! Mode 0 is real and runs through its own real-valued path.
//!
//! On the axis (row 0 of axial elements) the singular v/s terms are replaced
//! by ∂v/∂s. The ξ-part of that derivative is kept for every mode, the η-part
//! only for mode 1, where it does not vanish analytically.
//!
//! `quad_*` is the Hermitian adjoint of `grad_*`: for every mode,
//! `Σ conj(grad(u))·σ = Σ conj(u)·quad(σ)`.

use super::geometry::GeometricFactors;
use crate::spectral::{DiffOperators, Operators};
use ndarray::{Array2, ArrayView1, LinalgScalar, Zip};
use num_complex::Complex64;
use std::ops::{AddAssign, Mul};

/// Complex (npe × npe) matrix
pub type CMat = Array2<Complex64>;
/// Real (npe × npe) matrix
pub type RMat = Array2<f64>;
/// Vector field per mode: `[u_s, u_φ, u_z]`
pub type VectorModes = Vec<[CMat; 3]>;
/// Voigt strain or stress per mode
pub type VoigtModes = Vec<[CMat; 6]>;
/// Scalar field per mode
pub type ScalarModes = Vec<CMat>;

/// Scalar types the element kernels run on
pub trait FieldScalar: LinalgScalar + Mul<f64, Output = Self> + AddAssign + Send + Sync {}

impl FieldScalar for f64 {}
impl FieldScalar for Complex64 {}

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

fn hadamard<T: FieldScalar>(coef: &RMat, x: &Array2<T>) -> Array2<T> {
    Zip::from(coef).and(x).map_collect(|&c, &v| v * c)
}

fn add_hadamard<T: FieldScalar>(out: &mut Array2<T>, coef: &RMat, x: &Array2<T>) {
    Zip::from(out)
        .and(coef)
        .and(x)
        .for_each(|o, &c, &v| *o += v * c);
}

fn to_complex(m: &RMat) -> CMat {
    m.mapv(|x| Complex64::new(x, 0.0))
}

fn zeros(npe: usize) -> CMat {
    Array2::from_elem((npe, npe), ZERO)
}

/// Reference-space derivatives of one field
struct Derivs<T> {
    xi: Array2<T>,
    eta: Array2<T>,
}

impl<T: FieldScalar> Derivs<T> {
    fn of(ops: &Operators<T>, u: &Array2<T>) -> Self {
        Self {
            xi: ops.d_xi.dot(u),
            eta: u.dot(&ops.d_eta_t),
        }
    }
}

/// Gradient operator of one element
#[derive(Debug, Clone)]
pub struct Gradient {
    factors: GeometricFactors,
    axial: bool,
}

impl Gradient {
    pub fn new(factors: GeometricFactors, axial: bool) -> Self {
        Self { factors, axial }
    }

    pub fn factors(&self) -> &GeometricFactors {
        &self.factors
    }

    pub fn axial(&self) -> bool {
        self.axial
    }

    pub fn npe(&self) -> usize {
        self.factors.inv_s.nrows()
    }

    fn ds<T: FieldScalar>(&self, d: &Derivs<T>) -> Array2<T> {
        let mut out = hadamard(&self.factors.xi_s, &d.xi);
        add_hadamard(&mut out, &self.factors.eta_s, &d.eta);
        out
    }

    fn dz<T: FieldScalar>(&self, d: &Derivs<T>) -> Array2<T> {
        let mut out = hadamard(&self.factors.xi_z, &d.xi);
        add_hadamard(&mut out, &self.factors.eta_z, &d.eta);
        out
    }

    /// Adjoint of `ds`/`dz`: D_ξᵀ X + Y D_η
    fn quad_sz<T: FieldScalar>(
        &self,
        ops: &Operators<T>,
        s_part: &Array2<T>,
        z_part: &Array2<T>,
    ) -> Array2<T> {
        let f = &self.factors;
        let mut x = hadamard(&f.xi_s, s_part);
        add_hadamard(&mut x, &f.xi_z, z_part);
        let mut y = hadamard(&f.eta_s, s_part);
        add_hadamard(&mut y, &f.eta_z, z_part);
        ops.d_xi_t.dot(&x) + y.dot(&ops.d_eta)
    }

    /// out[0, :] += xi_s[0, :] ∘ dv[0, :]
    fn axis_xi<T: FieldScalar>(&self, out: &mut Array2<T>, dv_xi: &Array2<T>) {
        let coef = self.factors.xi_s.row(0);
        Zip::from(out.row_mut(0))
            .and(coef)
            .and(dv_xi.row(0))
            .for_each(|o, &c, &v| *o += v * c);
    }

    /// out[0, :] += eta_s[0, :] ∘ dv[0, :]
    fn axis_eta<T: FieldScalar>(&self, out: &mut Array2<T>, dv_eta: &Array2<T>) {
        let coef = self.factors.eta_s.row(0);
        Zip::from(out.row_mut(0))
            .and(coef)
            .and(dv_eta.row(0))
            .for_each(|o, &c, &v| *o += v * c);
    }

    /// Adjoint of `axis_xi`: f[k, j] += D_ξ[0, k] · xi_s[0, j] g[0, j]
    fn quad_axis_xi<T: FieldScalar>(&self, f: &mut Array2<T>, d_xi_row0: ArrayView1<f64>, g: &Array2<T>) {
        let coef = self.factors.xi_s.row(0);
        let c: Vec<T> = coef.iter().zip(g.row(0)).map(|(&x, &v)| v * x).collect();
        for (k, &d) in d_xi_row0.iter().enumerate() {
            for (j, &cj) in c.iter().enumerate() {
                f[[k, j]] += cj * d;
            }
        }
    }

    /// Adjoint of `axis_eta`: f[0, k] += Σ_j eta_s[0, j] g[0, j] D_η[j, k]
    fn quad_axis_eta<T: FieldScalar>(&self, f: &mut Array2<T>, d_eta: &RMat, g: &Array2<T>) {
        let coef = self.factors.eta_s.row(0);
        let c: Vec<T> = coef.iter().zip(g.row(0)).map(|(&x, &v)| v * x).collect();
        let n = d_eta.ncols();
        for k in 0..n {
            let mut acc = T::zero();
            for (j, &cj) in c.iter().enumerate() {
                acc += cj * d_eta[[j, k]];
            }
            f[[0, k]] += acc;
        }
    }

    // ------------------------------------------------------------------
    // solid: displacement → strain
    // ------------------------------------------------------------------

    /// Strain modes from displacement modes (`u.len() == nu + 1`)
    pub fn grad_vector(
        &self,
        ops: &DiffOperators,
        u: &[[CMat; 3]],
        nu: usize,
        nyquist: bool,
    ) -> VoigtModes {
        debug_assert_eq!(u.len(), nu + 1);
        let mut strain = Vec::with_capacity(nu + 1);
        strain.push(self.grad_vector_mode0(&ops.real, &u[0]));

        let nyquist = nyquist && nu > 0;
        let last = if nyquist { nu - 1 } else { nu };
        for (alpha, ua) in u.iter().enumerate().take(last + 1).skip(1) {
            strain.push(self.grad_vector_mode(ops, ua, alpha));
        }
        if nyquist {
            let npe = self.npe();
            strain.push(std::array::from_fn(|_| zeros(npe)));
        }
        strain
    }

    fn grad_vector_mode0(&self, ops: &Operators<f64>, u: &[CMat; 3]) -> [CMat; 6] {
        let f = &self.factors;
        let u0 = u[0].mapv(|c| c.re);
        let u1 = u[1].mapv(|c| c.re);
        let u2 = u[2].mapv(|c| c.re);
        let d0 = Derivs::of(ops, &u0);
        let d1 = Derivs::of(ops, &u1);
        let d2 = Derivs::of(ops, &u2);

        let e0 = self.ds(&d0);
        let mut e1 = hadamard(&f.inv_s, &u0);
        let e2 = self.dz(&d2);
        let e3 = self.dz(&d1);
        let e4 = self.dz(&d0) + self.ds(&d2);
        let mut e5 = self.ds(&d1) - hadamard(&f.inv_s, &u1);

        if self.axial {
            // v0 = u_s, v1 = -u_φ
            self.axis_xi(&mut e1, &d0.xi);
            let neg = d1.xi.mapv(|x| -x);
            self.axis_xi(&mut e5, &neg);
        }

        [
            to_complex(&e0),
            to_complex(&e1),
            to_complex(&e2),
            to_complex(&e3),
            to_complex(&e4),
            to_complex(&e5),
        ]
    }

    fn grad_vector_mode(&self, ops: &DiffOperators, u: &[CMat; 3], alpha: usize) -> [CMat; 6] {
        let f = &self.factors;
        let ia = Complex64::new(0.0, alpha as f64);
        let v0 = &u[0] + &u[1].mapv(|x| x * ia);
        let v1 = u[0].mapv(|x| x * ia) - &u[1];
        let v2 = u[2].mapv(|x| x * ia);

        let c = &ops.complex;
        let d0 = Derivs::of(c, &u[0]);
        let d1 = Derivs::of(c, &u[1]);
        let d2 = Derivs::of(c, &u[2]);

        let e0 = self.ds(&d0);
        let mut e1 = hadamard(&f.inv_s, &v0);
        let e2 = self.dz(&d2);
        let mut e3 = self.dz(&d1) + hadamard(&f.inv_s, &v2);
        let e4 = self.dz(&d0) + self.ds(&d2);
        let mut e5 = self.ds(&d1) + hadamard(&f.inv_s, &v1);

        if self.axial {
            let dv0 = &d0.xi + &d1.xi.mapv(|x| x * ia);
            let dv1 = d0.xi.mapv(|x| x * ia) - &d1.xi;
            let dv2 = d2.xi.mapv(|x| x * ia);
            self.axis_xi(&mut e1, &dv0);
            self.axis_xi(&mut e5, &dv1);
            self.axis_xi(&mut e3, &dv2);
            if alpha == 1 {
                let ev0 = &d0.eta + &d1.eta.mapv(|x| x * ia);
                let ev1 = d0.eta.mapv(|x| x * ia) - &d1.eta;
                self.axis_eta(&mut e1, &ev0);
                self.axis_eta(&mut e5, &ev1);
            }
        }

        [e0, e1, e2, e3, e4, e5]
    }

    // ------------------------------------------------------------------
    // solid: stress → force
    // ------------------------------------------------------------------

    /// Nodal force modes from stress modes (`sigma.len() == nu + 1`)
    pub fn quad_vector(
        &self,
        ops: &DiffOperators,
        sigma: &[[CMat; 6]],
        nu: usize,
        nyquist: bool,
    ) -> VectorModes {
        debug_assert_eq!(sigma.len(), nu + 1);
        let mut force = Vec::with_capacity(nu + 1);
        force.push(self.quad_vector_mode0(&ops.real, &sigma[0]));

        let nyquist = nyquist && nu > 0;
        let last = if nyquist { nu - 1 } else { nu };
        for (beta, sb) in sigma.iter().enumerate().take(last + 1).skip(1) {
            force.push(self.quad_vector_mode(ops, sb, beta));
        }
        if nyquist {
            let npe = self.npe();
            force.push(std::array::from_fn(|_| zeros(npe)));
        }
        force
    }

    fn quad_vector_mode0(&self, ops: &Operators<f64>, sigma: &[CMat; 6]) -> [CMat; 3] {
        let f = &self.factors;
        let s: [RMat; 6] = std::array::from_fn(|k| sigma[k].mapv(|c| c.re));
        let g0 = s[1].clone();
        let g1 = s[5].mapv(|x| -x);

        let mut f0 = self.quad_sz(ops, &s[0], &s[4]) + hadamard(&f.inv_s, &g0);
        let mut f1 = self.quad_sz(ops, &s[5], &s[3]) + hadamard(&f.inv_s, &g1);
        let f2 = self.quad_sz(ops, &s[4], &s[2]);

        if self.axial {
            self.quad_axis_xi(&mut f0, ops.d_xi.row(0), &g0);
            self.quad_axis_xi(&mut f1, ops.d_xi.row(0), &g1);
        }

        [to_complex(&f0), to_complex(&f1), to_complex(&f2)]
    }

    fn quad_vector_mode(&self, ops: &DiffOperators, s: &[CMat; 6], beta: usize) -> [CMat; 3] {
        let f = &self.factors;
        let mib = Complex64::new(0.0, -(beta as f64));
        let g0 = &s[1] + &s[5].mapv(|x| x * mib);
        let g1 = s[1].mapv(|x| x * mib) - &s[5];
        let g2 = s[3].mapv(|x| x * mib);

        let c = &ops.complex;
        let mut f0 = self.quad_sz(c, &s[0], &s[4]) + hadamard(&f.inv_s, &g0);
        let mut f1 = self.quad_sz(c, &s[5], &s[3]) + hadamard(&f.inv_s, &g1);
        let mut f2 = self.quad_sz(c, &s[4], &s[2]) + hadamard(&f.inv_s, &g2);

        if self.axial {
            let d_xi0 = ops.real.d_xi.row(0);
            self.quad_axis_xi(&mut f0, d_xi0, &g0);
            self.quad_axis_xi(&mut f1, d_xi0, &g1);
            self.quad_axis_xi(&mut f2, d_xi0, &g2);
            if beta == 1 {
                self.quad_axis_eta(&mut f0, &ops.real.d_eta, &g0);
                self.quad_axis_eta(&mut f1, &ops.real.d_eta, &g1);
            }
        }

        [f0, f1, f2]
    }

    // ------------------------------------------------------------------
    // fluid: potential → gradient, gradient-like stress → force
    // ------------------------------------------------------------------

    /// Gradient `[∂/∂s, (iα/s)·, ∂/∂z]` of scalar modes
    pub fn grad_scalar(
        &self,
        ops: &DiffOperators,
        chi: &[CMat],
        nu: usize,
        nyquist: bool,
    ) -> VectorModes {
        debug_assert_eq!(chi.len(), nu + 1);
        let npe = self.npe();
        let mut out = Vec::with_capacity(nu + 1);

        let c0 = chi[0].mapv(|c| c.re);
        let d = Derivs::of(&ops.real, &c0);
        out.push([to_complex(&self.ds(&d)), zeros(npe), to_complex(&self.dz(&d))]);

        let nyquist = nyquist && nu > 0;
        let last = if nyquist { nu - 1 } else { nu };
        for (alpha, ca) in chi.iter().enumerate().take(last + 1).skip(1) {
            let ia = Complex64::new(0.0, alpha as f64);
            let d = Derivs::of(&ops.complex, ca);
            let mut e1 = hadamard(&self.factors.inv_s, &ca.mapv(|x| x * ia));
            if self.axial {
                self.axis_xi(&mut e1, &d.xi.mapv(|x| x * ia));
                if alpha == 1 {
                    self.axis_eta(&mut e1, &d.eta.mapv(|x| x * ia));
                }
            }
            out.push([self.ds(&d), e1, self.dz(&d)]);
        }
        if nyquist {
            out.push(std::array::from_fn(|_| zeros(npe)));
        }
        out
    }

    /// Adjoint of [`Gradient::grad_scalar`]
    pub fn quad_scalar(
        &self,
        ops: &DiffOperators,
        sigma: &[[CMat; 3]],
        nu: usize,
        nyquist: bool,
    ) -> ScalarModes {
        debug_assert_eq!(sigma.len(), nu + 1);
        let mut out = Vec::with_capacity(nu + 1);

        let s0 = sigma[0][0].mapv(|c| c.re);
        let s2 = sigma[0][2].mapv(|c| c.re);
        out.push(to_complex(&self.quad_sz(&ops.real, &s0, &s2)));

        let nyquist = nyquist && nu > 0;
        let last = if nyquist { nu - 1 } else { nu };
        for (beta, sb) in sigma.iter().enumerate().take(last + 1).skip(1) {
            let mib = Complex64::new(0.0, -(beta as f64));
            let g = sb[1].mapv(|x| x * mib);
            let mut f = self.quad_sz(&ops.complex, &sb[0], &sb[2]) + hadamard(&self.factors.inv_s, &g);
            if self.axial {
                self.quad_axis_xi(&mut f, ops.real.d_xi.row(0), &g);
                if beta == 1 {
                    self.quad_axis_eta(&mut f, &ops.real.d_eta, &g);
                }
            }
            out.push(f);
        }
        if nyquist {
            out.push(zeros(self.npe()));
        }
        out
    }
}
