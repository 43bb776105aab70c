//! Elastic constitutive laws
//!
//! Constants are stored per node and pre-multiplied by the element's
//! integration factor, in arrays of shape `(nsamples, npe * npe)`. One sample
//! means axisymmetric material, evaluated mode by mode. `nr` samples mean 3-D
//! material, evaluated pointwise at the azimuth samples of the element.

use super::{ModeField, StrainField, StressField};
use crate::error::{Result, TransformError};
use crate::transform::{FourierPlans, mask_nyquist};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use num_complex::Complex64;

/// Orientation of the symmetry axis in the meridian plane, per node
///
/// θ is measured from the z axis towards s.
#[derive(Debug, Clone)]
pub struct Tilt {
    pub sin_t: Array2<f64>,
    pub cos_t: Array2<f64>,
    pub sin_2t: Array2<f64>,
    pub cos_2t: Array2<f64>,
}

impl Tilt {
    /// Tilt from per-node angles (radians), same shape as the moduli
    pub fn from_angles(theta: &Array2<f64>) -> Self {
        Self {
            sin_t: theta.mapv(f64::sin),
            cos_t: theta.mapv(f64::cos),
            sin_2t: theta.mapv(|t| (2.0 * t).sin()),
            cos_2t: theta.mapv(|t| (2.0 * t).cos()),
        }
    }
}

/// Elastic material of one element
#[derive(Debug, Clone)]
pub enum Elastic {
    Isotropic {
        lambda: Array2<f64>,
        mu: Array2<f64>,
    },
    /// Love parameters of a transversely isotropic medium
    TransverselyIsotropic {
        a: Array2<f64>,
        c: Array2<f64>,
        f: Array2<f64>,
        l: Array2<f64>,
        n: Array2<f64>,
        tilt: Option<Tilt>,
    },
}

/// Constants at one node of one azimuth sample
#[derive(Debug, Clone, Copy)]
enum Local {
    Iso {
        lambda: f64,
        mu: f64,
    },
    Ti {
        a: f64,
        c: f64,
        f: f64,
        l: f64,
        n: f64,
        /// (sin θ, cos θ, sin 2θ, cos 2θ)
        tilt: Option<[f64; 4]>,
    },
}

impl Local {
    fn stress<T>(&self, e: [T; 6]) -> [T; 6]
    where
        T: Copy + std::ops::Add<Output = T> + std::ops::Sub<Output = T> + std::ops::Mul<f64, Output = T>,
    {
        match *self {
            Local::Iso { lambda, mu } => {
                let tr = (e[0] + e[1] + e[2]) * lambda;
                [
                    tr + e[0] * (2.0 * mu),
                    tr + e[1] * (2.0 * mu),
                    tr + e[2] * (2.0 * mu),
                    e[3] * mu,
                    e[4] * mu,
                    e[5] * mu,
                ]
            }
            Local::Ti { a, c, f, l, n, tilt } => {
                let ti = |e: [T; 6]| {
                    [
                        e[0] * a + e[1] * (a - 2.0 * n) + e[2] * f,
                        e[0] * (a - 2.0 * n) + e[1] * a + e[2] * f,
                        (e[0] + e[1]) * f + e[2] * c,
                        e[3] * l,
                        e[4] * l,
                        e[5] * n,
                    ]
                };
                match tilt {
                    None => ti(e),
                    Some([st, ct, s2, c2]) => {
                        let cc = 0.5 * (1.0 + c2);
                        let ss = 0.5 * (1.0 - c2);
                        let h = 0.5 * s2;
                        // strain into the symmetry frame
                        let r = [
                            e[0] * cc + e[2] * ss - e[4] * h,
                            e[1],
                            e[0] * ss + e[2] * cc + e[4] * h,
                            e[3] * ct + e[5] * st,
                            (e[0] - e[2]) * s2 + e[4] * c2,
                            e[5] * ct - e[3] * st,
                        ];
                        let q = ti(r);
                        // transpose of the strain rotation
                        [
                            q[0] * cc + q[2] * ss + q[4] * s2,
                            q[1],
                            q[0] * ss + q[2] * cc - q[4] * s2,
                            q[3] * ct - q[5] * st,
                            (q[2] - q[0]) * h + q[4] * c2,
                            q[3] * st + q[5] * ct,
                        ]
                    }
                }
            }
        }
    }
}

impl Elastic {
    /// Number of azimuth samples the constants carry
    pub fn nsamples(&self) -> usize {
        match self {
            Elastic::Isotropic { mu, .. } => mu.nrows(),
            Elastic::TransverselyIsotropic { a, .. } => a.nrows(),
        }
    }

    pub fn is_3d(&self) -> bool {
        self.nsamples() > 1
    }

    fn local(&self, sample: usize, node: usize) -> Local {
        match self {
            Elastic::Isotropic { lambda, mu } => Local::Iso {
                lambda: lambda[[sample, node]],
                mu: mu[[sample, node]],
            },
            Elastic::TransverselyIsotropic {
                a,
                c,
                f,
                l,
                n,
                tilt,
            } => Local::Ti {
                a: a[[sample, node]],
                c: c[[sample, node]],
                f: f[[sample, node]],
                l: l[[sample, node]],
                n: n[[sample, node]],
                tilt: tilt.as_ref().map(|t| {
                    [
                        t.sin_t[[sample, node]],
                        t.cos_t[[sample, node]],
                        t.sin_2t[[sample, node]],
                        t.cos_2t[[sample, node]],
                    ]
                }),
            },
        }
    }

    /// Multiply every constant by the per-node integration factor
    pub fn scaled(mut self, integral: ArrayView1<f64>) -> Self {
        let scale = |m: &mut Array2<f64>| {
            for mut row in m.rows_mut() {
                Zip::from(&mut row).and(&integral).for_each(|x, &w| *x *= w);
            }
        };
        match &mut self {
            Elastic::Isotropic { lambda, mu } => {
                scale(lambda);
                scale(mu);
            }
            Elastic::TransverselyIsotropic { a, c, f, l, n, .. } => {
                for m in [a, c, f, l, n] {
                    scale(m);
                }
            }
        }
        self
    }

    /// Shear modulus used by attenuation (μ, or L for TI media), sample 0
    pub fn shear_modulus(&self) -> Array1<f64> {
        match self {
            Elastic::Isotropic { mu, .. } => mu.row(0).to_owned(),
            Elastic::TransverselyIsotropic { l, .. } => l.row(0).to_owned(),
        }
    }

    /// Check the material against an element with `nr` samples
    pub fn check_compatibility(&self, nr: usize, plans: &FourierPlans) -> std::result::Result<(), String> {
        let ns = self.nsamples();
        if ns != 1 && ns != nr {
            return Err(format!(
                "3-D material sampled at {} azimuths on an element with nr = {}",
                ns, nr
            ));
        }
        if nr > plans.max_nr() {
            return Err(format!(
                "nr = {} exceeds the transform plan cache (max {})",
                nr,
                plans.max_nr()
            ));
        }
        Ok(())
    }

    /// Stress modes from strain modes
    pub fn stress(&self, strain: &StrainField, nr: usize, plans: &FourierPlans) -> Result<StressField> {
        if self.is_3d() {
            self.stress_3d(strain, nr, plans)
        } else {
            Ok(self.stress_1d(strain))
        }
    }

    fn stress_1d(&self, strain: &StrainField) -> StressField {
        let (nmodes, nodes) = strain[0].dim();
        let mut out: StressField = std::array::from_fn(|_| Array2::zeros((nmodes, nodes)));
        for node in 0..nodes {
            let law = self.local(0, node);
            for m in 0..nmodes {
                let e: [Complex64; 6] = std::array::from_fn(|k| strain[k][[m, node]]);
                let s = law.stress(e);
                for k in 0..6 {
                    out[k][[m, node]] = s[k];
                }
            }
        }
        out
    }

    fn stress_3d(&self, strain: &StrainField, nr: usize, plans: &FourierPlans) -> Result<StressField> {
        let physical: Vec<Array2<f64>> = strain
            .iter()
            .map(|e| plans.c2r(nr, e))
            .collect::<std::result::Result<_, _>>()?;
        let nodes = physical[0].ncols();
        if self.nsamples() != nr {
            return Err(TransformError::ShapeMismatch {
                expected: (nr, nodes),
                actual: (self.nsamples(), nodes),
            }
            .into());
        }
        let mut sigma: Vec<Array2<f64>> = (0..6).map(|_| Array2::zeros((nr, nodes))).collect();
        for k in 0..nr {
            for node in 0..nodes {
                let e: [f64; 6] = std::array::from_fn(|c| physical[c][[k, node]]);
                let s = self.local(k, node).stress(e);
                for c in 0..6 {
                    sigma[c][[k, node]] = s[c];
                }
            }
        }
        let mut out: StressField = std::array::from_fn(|_| ModeField::zeros((0, 0)));
        for (o, s) in out.iter_mut().zip(&sigma) {
            *o = plans.r2c(nr, s)?;
            mask_nyquist(o, nr);
        }
        Ok(out)
    }
}
