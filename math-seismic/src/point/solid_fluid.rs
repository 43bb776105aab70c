//! Points on the solid-fluid interface
//!
//! The solid displacement loads the fluid, and the fluid acceleration that
//! results loads the solid back. Both halves are applied after assembly, in
//! that order, so the solid sees the fluid acceleration of the current step.

use super::nodal::Point;
use crate::error::{Result, SolverError};
use ndarray::Array2;
use num_complex::Complex64;
use std::time::Instant;

/// Subtract `n·u` from the fluid force accumulator, masked on the axis
fn load_fluid(fluid: &mut Point, u: &Array2<Complex64>, [ns, nz]: [f64; 2]) {
    for (mut f, u) in fluid.stiff.rows_mut().into_iter().zip(u.rows()) {
        f[0] -= u[0] * ns + u[2] * nz;
    }
    if fluid.axial {
        Point::mask_axis(&mut fluid.stiff);
    }
}

/// A solid and a fluid point sharing one location
#[derive(Debug, Clone)]
pub struct SolidFluidPoint {
    solid: Point,
    fluid: Point,
    /// Interface normal (solid to fluid) weighted by the edge quadrature, (n_s, n_z)
    normal: [f64; 2],
}

impl SolidFluidPoint {
    /// Pair two points; both sides must carry the same number of modes
    pub fn new(solid: Point, fluid: Point, normal: [f64; 2]) -> Result<Self> {
        if solid.nr() != fluid.nr() {
            return Err(SolverError::IncompatibleCoupling {
                tag: solid.tag,
                solid_nr: solid.nr(),
                fluid_nr: fluid.nr(),
            });
        }
        Ok(Self { solid, fluid, normal })
    }

    pub fn solid(&self) -> &Point {
        &self.solid
    }

    pub fn fluid(&self) -> &Point {
        &self.fluid
    }

    pub fn solid_mut(&mut self) -> &mut Point {
        &mut self.solid
    }

    pub fn fluid_mut(&mut self) -> &mut Point {
        &mut self.fluid
    }

    /// Both sides at once
    pub fn parts_mut(&mut self) -> (&mut Point, &mut Point) {
        (&mut self.solid, &mut self.fluid)
    }

    pub fn normal(&self) -> [f64; 2] {
        self.normal
    }

    /// Exchange interface forces between the two media
    ///
    /// The fluid is loaded with `-n·u` and the solid with `+n χ̈`, which keeps
    /// the coupled system energy-conserving.
    pub fn couple(&mut self) {
        self.couple_solid_to_fluid();
        self.couple_fluid_to_solid();
    }

    fn couple_solid_to_fluid(&mut self) {
        load_fluid(&mut self.fluid, &self.solid.displ, self.normal);
    }

    fn couple_fluid_to_solid(&mut self) {
        let [ns, nz] = self.normal;
        let inv_mass = self.fluid.inv_mass;
        for (mut f, chi) in self
            .solid
            .stiff
            .rows_mut()
            .into_iter()
            .zip(self.fluid.stiff.rows())
        {
            let acc = chi[0] * inv_mass;
            f[0] += acc * ns;
            f[2] += acc * nz;
        }
    }

    /// Load the fluid side with the solid displacement, or with the
    /// half-step velocity `v + dt/2 a` when `half_step` is given
    pub fn load_fluid_from_solid(&mut self, half_step: Option<f64>) {
        match half_step {
            None => load_fluid(&mut self.fluid, &self.solid.displ, self.normal),
            Some(dt) => {
                let vh = self.solid.half_step_veloc(dt);
                load_fluid(&mut self.fluid, &vh, self.normal);
            }
        }
    }

    /// Mean time of one coupling exchange over `count` runs on a scratch copy
    pub fn measure_coupling(&self, count: usize) -> f64 {
        let mut scratch = self.clone();
        let start = Instant::now();
        for _ in 0..count {
            scratch.couple();
        }
        start.elapsed().as_secs_f64() / count.max(1) as f64
    }

    pub fn update_newmark(&mut self, dt: f64) {
        self.solid.update_newmark(dt);
        self.fluid.update_newmark(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn pair(normal: [f64; 2]) -> SolidFluidPoint {
        let mut solid = Point::new(3, [1.0, 0.5], 4, 3, false);
        let mut fluid = Point::new(3, [1.0, 0.5], 4, 1, false);
        solid.set_mass(1.0);
        fluid.set_mass(0.5);
        solid.displ[[0, 0]] = Complex64::new(0.2, 0.0);
        solid.displ[[0, 2]] = Complex64::new(1.0, 0.0);
        fluid.stiff[[0, 0]] = Complex64::new(0.3, 0.0);
        SolidFluidPoint::new(solid, fluid, normal).unwrap()
    }

    #[test]
    fn test_mismatched_modes_rejected() {
        let solid = Point::new(8, [1.0, 0.0], 4, 3, false);
        let fluid = Point::new(8, [1.0, 0.0], 6, 1, false);
        let err = SolidFluidPoint::new(solid, fluid, [0.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            SolverError::IncompatibleCoupling {
                tag: 8,
                solid_nr: 4,
                fluid_nr: 6
            }
        ));
    }

    #[test]
    fn test_coupling_order() {
        let mut p = pair([0.5, 2.0]);
        p.couple();
        // F_f = 0.3 - (0.5 * 0.2 + 2 * 1) = -1.8, χ̈ = -3.6
        assert_relative_eq!(p.fluid().stiff[[0, 0]].re, -1.8, epsilon = 1e-14);
        assert_relative_eq!(p.solid().stiff[[0, 0]].re, -1.8, epsilon = 1e-14);
        assert_relative_eq!(p.solid().stiff[[0, 2]].re, -7.2, epsilon = 1e-14);

        // the other order loads the solid with the uncoupled χ̈ = 0.6
        let mut q = pair([0.5, 2.0]);
        q.couple_fluid_to_solid();
        q.couple_solid_to_fluid();
        assert_relative_eq!(q.fluid().stiff[[0, 0]].re, -1.8, epsilon = 1e-14);
        assert_relative_eq!(q.solid().stiff[[0, 2]].re, 1.2, epsilon = 1e-14);
        assert!((q.solid().stiff[[0, 2]].re - p.solid().stiff[[0, 2]].re).abs() > 1.0);
    }

    #[test]
    fn test_coupling_work_without_fluid_stiffness() {
        // u·F_s = -(n·u)² / M_f: the interface only ever stores energy
        let mut p = pair([0.6, -0.8]);
        p.fluid_mut().stiff.fill(Complex64::new(0.0, 0.0));
        p.couple();
        let work = p.solid().stiff[[0, 0]].re * 0.2 + p.solid().stiff[[0, 2]].re * 1.0;
        let n_dot_u: f64 = 0.6 * 0.2 - 0.8 * 1.0;
        assert_relative_eq!(work, -n_dot_u.powi(2) * 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_load_from_half_step_velocity() {
        let mut p = pair([1.0, 0.0]);
        p.fluid_mut().stiff.fill(Complex64::new(0.0, 0.0));
        p.solid_mut().veloc[[0, 0]] = Complex64::new(1.0, 0.0);
        p.solid_mut().accel[[0, 0]] = Complex64::new(4.0, 0.0);
        p.load_fluid_from_solid(Some(0.5));
        // v + dt/2 a = 2
        assert_relative_eq!(p.fluid().stiff[[0, 0]].re, -2.0, epsilon = 1e-14);
        assert_eq!(p.solid().stiff[[0, 0]].re, 0.0);
    }
}
