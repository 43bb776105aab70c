//! Anelastic attenuation with standard linear solids
//!
//! Each relaxation mechanism l carries memory variables M_l of the deviatoric
//! strain, updated with the recursive convolution
//!
//! ```text
//! M_l(n+1) = α_l M_l(n) + β_l d(n) + γ_l d(n+1)
//! ```
//!
//! which is exact for strain varying linearly over a step. The elastic stress
//! is then reduced by Σ_l δμ_l M_l. Only shear attenuation is modelled.

use super::{StrainField, StressField};
use ndarray::{Array1, Array2, Zip};
use num_complex::Complex64;

/// Memory-variable state of one element
#[derive(Debug, Clone)]
pub struct Attenuation {
    alpha: Vec<f64>,
    beta: Vec<f64>,
    gamma: Vec<f64>,
    /// Modulus defect per mechanism and node
    delta_mu: Vec<Array1<f64>>,
    memory: Vec<StressField>,
    previous: Option<StrainField>,
}

/// Mechanism weights for a nearly constant quality factor `q` over the band
/// spanned by the relaxation times
pub fn constant_q_weights(taus: &[f64], q: f64) -> Vec<f64> {
    if taus.is_empty() || q <= 0.0 {
        return vec![0.0; taus.len()];
    }
    let min = taus.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = taus.iter().cloned().fold(0.0, f64::max);
    let spacing = if taus.len() > 1 {
        (max / min).ln() / (taus.len() - 1) as f64
    } else {
        std::f64::consts::LN_10
    };
    vec![2.0 * spacing / (std::f64::consts::PI * q); taus.len()]
}

impl Attenuation {
    /// Standard linear solids with relaxation times `taus` and shear modulus
    /// `shear` (already scaled by the integration factor)
    pub fn standard_linear_solid(dt: f64, taus: &[f64], q: f64, shear: &Array1<f64>) -> Self {
        let weights = constant_q_weights(taus, q);
        let mut alpha = Vec::with_capacity(taus.len());
        let mut beta = Vec::with_capacity(taus.len());
        let mut gamma = Vec::with_capacity(taus.len());
        for &tau in taus {
            let a = (-dt / tau).exp();
            let r = tau * (1.0 - a) / dt;
            alpha.push(a);
            beta.push(r - a);
            gamma.push(1.0 - r);
        }
        Self {
            alpha,
            beta,
            gamma,
            delta_mu: weights.iter().map(|&y| shear * y).collect(),
            memory: Vec::new(),
            previous: None,
        }
    }

    pub fn mechanisms(&self) -> usize {
        self.alpha.len()
    }

    /// Reduce `stress` by the memory variables, advancing them with `strain`
    /// when `advance` is set
    pub fn apply(&mut self, strain: &StrainField, stress: &mut StressField, advance: bool) {
        let dim = strain[0].dim();
        let current = deviatoric(strain);
        if self.memory.is_empty() || self.memory[0][0].dim() != dim {
            self.memory = (0..self.mechanisms())
                .map(|_| std::array::from_fn(|_| Array2::zeros(dim)))
                .collect();
        }

        if advance {
            let zero: StrainField = std::array::from_fn(|_| Array2::zeros(dim));
            let previous = match self.previous.as_ref() {
                Some(p) if p[0].dim() == dim => p,
                _ => &zero,
            };
            for (l, mem) in self.memory.iter_mut().enumerate() {
                let (a, b, g) = (self.alpha[l], self.beta[l], self.gamma[l]);
                for k in 0..6 {
                    Zip::from(&mut mem[k])
                        .and(&previous[k])
                        .and(&current[k])
                        .for_each(|m, &p, &c| *m = *m * a + p * b + c * g);
                }
            }
            self.previous = Some(current);
        }

        for (mem, dmu) in self.memory.iter().zip(&self.delta_mu) {
            for k in 0..6 {
                for (mut s_row, m_row) in stress[k].rows_mut().into_iter().zip(mem[k].rows()) {
                    Zip::from(&mut s_row)
                        .and(&m_row)
                        .and(dmu)
                        .for_each(|s, &m, &d| *s -= m * d);
                }
            }
        }
    }
}

/// Deviatoric strain in the form [2(e_ii - tr/3), γ_φz, γ_sz, γ_sφ]
fn deviatoric(e: &StrainField) -> StrainField {
    let third = 1.0 / 3.0;
    let tr = &e[0] + &e[1] + &e[2];
    let normal = |x: &Array2<Complex64>| (x - &(&tr * third)) * 2.0;
    [
        normal(&e[0]),
        normal(&e[1]),
        normal(&e[2]),
        e[3].clone(),
        e[4].clone(),
        e[5].clone(),
    ]
}
