//! Nodal spectral bases on [-1, 1]
//!
//! Provides Gauss-Lobatto-Legendre (GLL) nodes for ordinary elements and
//! Gauss-Lobatto-Jacobi (0,1) nodes for the ξ direction of elements touching
//! the symmetry axis. The GLJ rule integrates against the weight (1 + ξ), which
//! absorbs the vanishing radius at the axis.

use super::quadrature::gauss_legendre_1d;
use ndarray::Array2;
use std::f64::consts::PI;

/// Smallest supported polynomial order
pub const MIN_NPOL: usize = 2;
/// Largest supported polynomial order (weights are integrated exactly up to here)
pub const MAX_NPOL: usize = 8;

/// Kind of collocation nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFamily {
    /// Gauss-Lobatto-Legendre, weight 1
    Gll,
    /// Gauss-Lobatto-Jacobi (0, 1), weight (1 + ξ)
    Glj,
}

/// Evaluate the Jacobi polynomial P_n^(a,b)(x) and its derivative
pub fn jacobi(n: usize, a: f64, b: f64, x: f64) -> (f64, f64) {
    let value = jacobi_value(n, a, b, x);
    let deriv = if n == 0 {
        0.0
    } else {
        0.5 * (n as f64 + a + b + 1.0) * jacobi_value(n - 1, a + 1.0, b + 1.0, x)
    };
    (value, deriv)
}

fn jacobi_value(n: usize, a: f64, b: f64, x: f64) -> f64 {
    let mut p0 = 1.0;
    if n == 0 {
        return p0;
    }
    let mut p1 = 0.5 * ((a + b + 2.0) * x + (a - b));
    for k in 1..n {
        let k = k as f64;
        let c = 2.0 * k + a + b;
        let a1 = 2.0 * (k + 1.0) * (k + a + b + 1.0) * c;
        let a2 = (c + 1.0) * (a * a - b * b);
        let a3 = c * (c + 1.0) * (c + 2.0);
        let a4 = 2.0 * (k + a) * (k + b) * (c + 2.0);
        let p2 = ((a2 + a3 * x) * p1 - a4 * p0) / a1;
        p0 = p1;
        p1 = p2;
    }
    p1
}

/// Roots of P_n^(a,b) in ascending order (Newton iteration with deflation)
pub fn jacobi_roots(n: usize, a: f64, b: f64) -> Vec<f64> {
    let mut roots: Vec<f64> = Vec::with_capacity(n);
    for k in 0..n {
        let mut r = -((2 * k + 1) as f64 * PI / (2 * n) as f64).cos();
        if k > 0 {
            r = 0.5 * (r + roots[k - 1]);
        }
        for _ in 0..100 {
            let deflation: f64 = roots.iter().map(|&x| 1.0 / (r - x)).sum();
            let (p, dp) = jacobi(n, a, b, r);
            let delta = -p / (dp - deflation * p);
            r += delta;
            if delta.abs() < 1e-15 {
                break;
            }
        }
        roots.push(r);
    }
    roots
}

/// A set of collocation nodes with quadrature weights and differentiation matrix
#[derive(Debug, Clone)]
pub struct NodalBasis {
    /// Node family
    pub family: NodeFamily,
    /// Nodes on [-1, 1], ascending, endpoints included
    pub points: Vec<f64>,
    /// Quadrature weights (for weight function 1 or 1 + ξ)
    pub weights: Vec<f64>,
    /// Barycentric weights of the nodes
    barycentric: Vec<f64>,
    /// Differentiation matrix D[i][k] = ℓ_k'(x_i)
    pub diff: Array2<f64>,
}

impl NodalBasis {
    /// Build the basis of polynomial order `npol` (npol + 1 nodes)
    pub fn new(family: NodeFamily, npol: usize) -> Self {
        assert!(
            (MIN_NPOL..=MAX_NPOL).contains(&npol),
            "polynomial order {} outside {}..={}",
            npol,
            MIN_NPOL,
            MAX_NPOL
        );
        let beta = match family {
            NodeFamily::Gll => 0.0,
            NodeFamily::Glj => 1.0,
        };

        let mut points = Vec::with_capacity(npol + 1);
        points.push(-1.0);
        points.extend(jacobi_roots(npol - 1, 1.0, 1.0 + beta));
        points.push(1.0);

        let barycentric = barycentric_weights(&points);
        let diff = differentiation_matrix(&points, &barycentric);

        let mut basis = Self {
            family,
            points,
            weights: Vec::new(),
            barycentric,
            diff,
        };

        // w_j = ∫ ℓ_j(x) (1 + x)^β dx, integrated exactly by 5-point Gauss-Legendre
        let mut weights = vec![0.0; npol + 1];
        for qp in gauss_legendre_1d(5) {
            let factor = qp.weight * (1.0 + qp.xi).powf(beta);
            for (w, l) in weights.iter_mut().zip(basis.lagrange(qp.xi)) {
                *w += factor * l;
            }
        }
        basis.weights = weights;
        basis
    }

    pub fn gll(npol: usize) -> Self {
        Self::new(NodeFamily::Gll, npol)
    }

    pub fn glj(npol: usize) -> Self {
        Self::new(NodeFamily::Glj, npol)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Values of all Lagrange polynomials at x
    pub fn lagrange(&self, x: f64) -> Vec<f64> {
        if let Some(j) = self.points.iter().position(|&p| (x - p).abs() < 1e-14) {
            let mut values = vec![0.0; self.len()];
            values[j] = 1.0;
            return values;
        }
        let terms: Vec<f64> = self
            .points
            .iter()
            .zip(&self.barycentric)
            .map(|(&p, &l)| l / (x - p))
            .collect();
        let denom: f64 = terms.iter().sum();
        terms.into_iter().map(|t| t / denom).collect()
    }
}

fn barycentric_weights(points: &[f64]) -> Vec<f64> {
    points
        .iter()
        .enumerate()
        .map(|(j, &xj)| {
            let prod: f64 = points
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != j)
                .map(|(_, &xk)| xj - xk)
                .product();
            1.0 / prod
        })
        .collect()
}

fn differentiation_matrix(points: &[f64], barycentric: &[f64]) -> Array2<f64> {
    let n = points.len();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let v = (barycentric[j] / barycentric[i]) / (points[i] - points[j]);
                d[[i, j]] = v;
                diag -= v;
            }
        }
        d[[i, i]] = diag;
    }
    d
}
