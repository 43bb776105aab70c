//! Element geometry in the meridian (s, z) plane
//!
//! Bilinear quadrilaterals mapped from the reference square [-1, 1]², and the
//! per-node factors the gradient operator needs: inverse Jacobian entries,
//! 1/s, and the integration factor of the axisymmetric volume element.

use crate::spectral::NodalBasis;
use ndarray::Array2;

/// Evaluate Q1 quadrilateral basis functions at (xi, eta)
pub fn q1_quadrilateral(xi: f64, eta: f64) -> [f64; 4] {
    [
        0.25 * (1.0 - xi) * (1.0 - eta),
        0.25 * (1.0 + xi) * (1.0 - eta),
        0.25 * (1.0 + xi) * (1.0 + eta),
        0.25 * (1.0 - xi) * (1.0 + eta),
    ]
}

/// Evaluate Q1 quadrilateral basis function gradients at (xi, eta)
pub fn q1_quadrilateral_grad(xi: f64, eta: f64) -> [[f64; 2]; 4] {
    [
        [-0.25 * (1.0 - eta), -0.25 * (1.0 - xi)],
        [0.25 * (1.0 - eta), -0.25 * (1.0 + xi)],
        [0.25 * (1.0 + eta), 0.25 * (1.0 + xi)],
        [-0.25 * (1.0 + eta), 0.25 * (1.0 - xi)],
    ]
}

/// Jacobian of the map (xi, eta) -> (s, z)
#[derive(Debug, Clone, Copy)]
pub struct Jacobian {
    /// [[ds/dxi, ds/deta], [dz/dxi, dz/deta]]
    pub matrix: [[f64; 2]; 2],
    /// Determinant
    pub det: f64,
}

impl Jacobian {
    /// Inverse entries (dxi/ds, deta/ds, dxi/dz, deta/dz)
    pub fn inverse(&self) -> [f64; 4] {
        let [[s_xi, s_eta], [z_xi, z_eta]] = self.matrix;
        let inv = 1.0 / self.det;
        [z_eta * inv, -z_xi * inv, -s_eta * inv, s_xi * inv]
    }
}

/// Bilinear map of one quadrilateral, corners counter-clockwise
///
/// Corner order is (-1,-1), (1,-1), (1,1), (-1,1). Side k joins corner k
/// and corner k+1; side 3 is the ξ = -1 edge.
#[derive(Debug, Clone, Copy)]
pub struct QuadMap {
    pub corners: [[f64; 2]; 4],
}

impl QuadMap {
    pub fn new(corners: [[f64; 2]; 4]) -> Self {
        Self { corners }
    }

    /// Physical (s, z) at reference (xi, eta)
    pub fn map(&self, xi: f64, eta: f64) -> [f64; 2] {
        let n = q1_quadrilateral(xi, eta);
        let mut p = [0.0; 2];
        for (c, w) in self.corners.iter().zip(n) {
            p[0] += w * c[0];
            p[1] += w * c[1];
        }
        p
    }

    pub fn jacobian(&self, xi: f64, eta: f64) -> Jacobian {
        let grad = q1_quadrilateral_grad(xi, eta);
        let mut j = [[0.0; 2]; 2];
        for (g, c) in grad.iter().zip(&self.corners) {
            j[0][0] += g[0] * c[0];
            j[0][1] += g[1] * c[0];
            j[1][0] += g[0] * c[1];
            j[1][1] += g[1] * c[1];
        }
        let det = j[0][0] * j[1][1] - j[0][1] * j[1][0];
        Jacobian { matrix: j, det }
    }

    /// Reference coordinates of a physical point, if inside (with tolerance)
    pub fn inverse_map(&self, s: f64, z: f64) -> Option<(f64, f64)> {
        let (mut xi, mut eta) = (0.0, 0.0);
        for _ in 0..50 {
            let p = self.map(xi, eta);
            let (rs, rz) = (s - p[0], z - p[1]);
            let jac = self.jacobian(xi, eta);
            if jac.det.abs() < f64::MIN_POSITIVE {
                return None;
            }
            let [xs, es, xz, ez] = jac.inverse();
            let dxi = xs * rs + xz * rz;
            let deta = es * rs + ez * rz;
            xi += dxi;
            eta += deta;
            if dxi.abs() + deta.abs() < 1e-13 {
                break;
            }
        }
        let tol = 1e-9;
        if xi.abs() <= 1.0 + tol && eta.abs() <= 1.0 + tol {
            Some((xi.clamp(-1.0, 1.0), eta.clamp(-1.0, 1.0)))
        } else {
            None
        }
    }

    /// Rotate corner order so that `side` becomes side 3 (the ξ = -1 edge)
    pub fn rotated_to_side3(corners: [usize; 4], side: usize) -> [usize; 4] {
        let shift = (side + 1) % 4;
        std::array::from_fn(|k| corners[(k + shift) % 4])
    }
}

/// Per-node factors of one element, shape (npe, npe) indexed [ξ, η]
#[derive(Debug, Clone)]
pub struct GeometricFactors {
    /// ∂ξ/∂s
    pub xi_s: Array2<f64>,
    /// ∂η/∂s
    pub eta_s: Array2<f64>,
    /// ∂ξ/∂z
    pub xi_z: Array2<f64>,
    /// ∂η/∂z
    pub eta_z: Array2<f64>,
    /// 1/s, zero on the axis row of axial elements
    pub inv_s: Array2<f64>,
    /// w_ξ w_η |J| s (s/(1+ξ) with GLJ weights on axial elements)
    pub integral: Array2<f64>,
    /// Physical coordinates of the nodes
    pub coords: Array2<[f64; 2]>,
}

impl GeometricFactors {
    /// Compute factors at the collocation nodes of an element
    ///
    /// Returns `Err` with a message when the map is degenerate or inverted, or
    /// when a non-axial element reaches the axis.
    pub fn new(
        map: &QuadMap,
        xi_basis: &NodalBasis,
        eta_basis: &NodalBasis,
        axial: bool,
    ) -> Result<Self, String> {
        let npe = xi_basis.len();
        let mut out = Self {
            xi_s: Array2::zeros((npe, npe)),
            eta_s: Array2::zeros((npe, npe)),
            xi_z: Array2::zeros((npe, npe)),
            eta_z: Array2::zeros((npe, npe)),
            inv_s: Array2::zeros((npe, npe)),
            integral: Array2::zeros((npe, npe)),
            coords: Array2::from_elem((npe, npe), [0.0; 2]),
        };

        for i in 0..npe {
            let xi = xi_basis.points[i];
            for j in 0..npe {
                let eta = eta_basis.points[j];
                let p = map.map(xi, eta);
                let jac = map.jacobian(xi, eta);
                if jac.det <= 0.0 {
                    return Err(format!(
                        "non-positive Jacobian {:.3e} at (s, z) = ({:.6e}, {:.6e})",
                        jac.det, p[0], p[1]
                    ));
                }
                let [xs, es, xz, ez] = jac.inverse();
                out.xi_s[[i, j]] = xs;
                out.eta_s[[i, j]] = es;
                out.xi_z[[i, j]] = xz;
                out.eta_z[[i, j]] = ez;
                out.coords[[i, j]] = p;

                let weight = xi_basis.weights[i] * eta_basis.weights[j] * jac.det;
                if axial {
                    // s/(1+ξ) → ds/dξ on the axis
                    let s_eff = if i == 0 {
                        jac.matrix[0][0]
                    } else {
                        p[0] / (1.0 + xi)
                    };
                    out.integral[[i, j]] = weight * s_eff;
                    out.inv_s[[i, j]] = if i == 0 { 0.0 } else { 1.0 / p[0] };
                } else {
                    if p[0] <= 0.0 {
                        return Err(format!(
                            "node at s = {:.6e} in an element not flagged as axial",
                            p[0]
                        ));
                    }
                    out.integral[[i, j]] = weight * p[0];
                    out.inv_s[[i, j]] = 1.0 / p[0];
                }
            }
        }
        Ok(out)
    }

    /// Smallest distance between neighbouring nodes
    pub fn min_spacing(&self) -> f64 {
        let (n0, n1) = self.coords.dim();
        let dist = |a: [f64; 2], b: [f64; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        let mut min = f64::INFINITY;
        for i in 0..n0 {
            for j in 0..n1 {
                if i + 1 < n0 {
                    min = min.min(dist(self.coords[[i, j]], self.coords[[i + 1, j]]));
                }
                if j + 1 < n1 {
                    min = min.min(dist(self.coords[[i, j]], self.coords[[i, j + 1]]));
                }
            }
        }
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square_at(s0: f64) -> QuadMap {
        QuadMap::new([[s0, 0.0], [s0 + 1.0, 0.0], [s0 + 1.0, 1.0], [s0, 1.0]])
    }

    #[test]
    fn test_map_corners() {
        let m = unit_square_at(2.0);
        assert_eq!(m.map(-1.0, -1.0), [2.0, 0.0]);
        assert_eq!(m.map(1.0, 1.0), [3.0, 1.0]);
        let jac = m.jacobian(0.3, -0.2);
        assert_relative_eq!(jac.det, 0.25, epsilon = 1e-14);
    }

    #[test]
    fn test_inverse_map() {
        let m = QuadMap::new([[1.0, 0.0], [2.5, 0.2], [2.2, 1.4], [0.9, 1.1]]);
        let p = m.map(0.4, -0.7);
        let (xi, eta) = m.inverse_map(p[0], p[1]).unwrap();
        assert_relative_eq!(xi, 0.4, epsilon = 1e-10);
        assert_relative_eq!(eta, -0.7, epsilon = 1e-10);
        assert!(m.inverse_map(10.0, 10.0).is_none());
    }

    #[test]
    fn test_rotation_to_side3() {
        // side 0 joins corners 0 and 1; after rotation it must join corners 3 and 0
        let rotated = QuadMap::rotated_to_side3([10, 11, 12, 13], 0);
        assert_eq!(rotated, [11, 12, 13, 10]);
        assert_eq!(QuadMap::rotated_to_side3([10, 11, 12, 13], 3), [10, 11, 12, 13]);
    }

    #[test]
    fn test_integral_is_meridian_volume() {
        // ∫∫ s ds dz over [1, 2] x [0, 1] = 1.5
        let gll = NodalBasis::gll(4);
        let g = GeometricFactors::new(&unit_square_at(1.0), &gll, &gll, false).unwrap();
        assert_relative_eq!(g.integral.sum(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_axial_integral() {
        // ∫∫ s ds dz over [0, 1] x [0, 1] = 0.5
        let gll = NodalBasis::gll(4);
        let glj = NodalBasis::glj(4);
        let g = GeometricFactors::new(&unit_square_at(0.0), &glj, &gll, true).unwrap();
        assert_relative_eq!(g.integral.sum(), 0.5, epsilon = 1e-12);
        assert!(g.integral.row(0).iter().all(|&w| w > 0.0));
        assert!(g.inv_s.row(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nonaxial_element_on_axis_rejected() {
        let gll = NodalBasis::gll(3);
        assert!(GeometricFactors::new(&unit_square_at(0.0), &gll, &gll, false).is_err());
    }

    #[test]
    fn test_inverted_element_rejected() {
        let gll = NodalBasis::gll(3);
        let m = QuadMap::new([[1.0, 0.0], [1.0, 1.0], [2.0, 1.0], [2.0, 0.0]]);
        assert!(GeometricFactors::new(&m, &gll, &gll, false).is_err());
    }
}
