//! Spectral element: gather, constitutive evaluation, scatter

use super::gradient::{CMat, Gradient, ScalarModes, VectorModes, VoigtModes};
use crate::error::{Result, SolverError};
use crate::material::{Acoustic, Attenuation, Elastic, GradField, ModeField, StrainField};
use crate::point::{DomainPoint, Field, Point, mode_weight};
use crate::spectral::SpectralContext;
use crate::transform::has_nyquist;
use ndarray::Array2;
use num_complex::Complex64;
use std::time::Instant;

/// Medium of an element with its material
#[derive(Debug, Clone)]
pub enum ElementPhysics {
    Solid {
        elastic: Elastic,
        attenuation: Option<Attenuation>,
    },
    Fluid {
        acoustic: Acoustic,
    },
}

/// Nodal forces K·u of one element, per mode
#[derive(Debug, Clone)]
pub enum ElementForce {
    Solid(VectorModes),
    Fluid(ScalarModes),
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Global element index
    pub tag: usize,
    /// Domain point index of node (i, j) at `i * npe + j`
    points: Vec<usize>,
    gradient: Gradient,
    physics: ElementPhysics,
    nr: usize,
}

impl Element {
    /// Build an element, rejecting materials it cannot evaluate
    pub fn new(
        tag: usize,
        points: Vec<usize>,
        gradient: Gradient,
        physics: ElementPhysics,
        nr: usize,
        ctx: &SpectralContext,
    ) -> Result<Self> {
        let npe = gradient.npe();
        if points.len() != npe * npe {
            return Err(SolverError::MalformedMesh(format!(
                "element {} has {} points, expected {}",
                tag,
                points.len(),
                npe * npe
            )));
        }
        let check = match &physics {
            ElementPhysics::Solid {
                elastic,
                attenuation,
            } => {
                if attenuation.is_some() && elastic.is_3d() {
                    Err("attenuation is only supported for axisymmetric material".to_string())
                } else {
                    elastic.check_compatibility(nr, &ctx.plans)
                }
            }
            ElementPhysics::Fluid { acoustic } => acoustic.check_compatibility(nr, &ctx.plans),
        };
        check.map_err(|reason| SolverError::UnsupportedMaterial {
            element: tag,
            reason,
        })?;

        Ok(Self {
            tag,
            points,
            gradient,
            physics,
            nr,
        })
    }

    pub fn nr(&self) -> usize {
        self.nr
    }

    pub fn nu(&self) -> usize {
        self.nr / 2
    }

    pub fn nyquist(&self) -> bool {
        has_nyquist(self.nr)
    }

    pub fn axial(&self) -> bool {
        self.gradient.axial()
    }

    pub fn is_fluid(&self) -> bool {
        matches!(self.physics, ElementPhysics::Fluid { .. })
    }

    pub fn points(&self) -> &[usize] {
        &self.points
    }

    pub fn gradient(&self) -> &Gradient {
        &self.gradient
    }

    pub fn physics(&self) -> &ElementPhysics {
        &self.physics
    }

    fn part<'a>(&self, point: &'a DomainPoint) -> Result<&'a Point> {
        let part = if self.is_fluid() {
            point.fluid()
        } else {
            point.solid()
        };
        part.ok_or_else(|| {
            SolverError::MalformedMesh(format!(
                "element {} touches point {} of the other medium",
                self.tag,
                point.tag()
            ))
        })
    }

    /// Modes `0..=nu` of one field at the element nodes, per component
    fn gather(&self, points: &[DomainPoint], which: Field) -> Result<Vec<Vec<CMat>>> {
        let npe = self.gradient.npe();
        let ncomp = if self.is_fluid() { 1 } else { 3 };
        let nmodes = self.nu() + 1;
        let zero = Complex64::new(0.0, 0.0);
        let mut out: Vec<Vec<CMat>> = (0..nmodes)
            .map(|_| (0..ncomp).map(|_| Array2::from_elem((npe, npe), zero)).collect())
            .collect();
        for (node, &idx) in self.points.iter().enumerate() {
            let field = self.part(&points[idx])?.field(which);
            let (i, j) = (node / npe, node % npe);
            for (m, modes) in out.iter_mut().enumerate() {
                for (k, comp) in modes.iter_mut().enumerate() {
                    comp[[i, j]] = field[[m, k]];
                }
            }
        }
        Ok(out)
    }

    /// Elemental K·u from the current displacement
    ///
    /// `advance_attenuation` moves the memory variables forward one step; it is
    /// set in the time loop and cleared for diagnostics.
    pub fn compute_forces(
        &mut self,
        points: &[DomainPoint],
        ctx: &SpectralContext,
        advance_attenuation: bool,
    ) -> Result<ElementForce> {
        let displ = self.gather(points, Field::Displ)?;
        self.forces_from(displ, ctx, advance_attenuation)
    }

    fn forces_from(
        &mut self,
        u: Vec<Vec<CMat>>,
        ctx: &SpectralContext,
        advance_attenuation: bool,
    ) -> Result<ElementForce> {
        let (nr, nu, nyquist) = (self.nr, self.nu(), self.nyquist());
        let ops = ctx.operators(self.gradient.axial());
        let npe = self.gradient.npe();

        match &mut self.physics {
            ElementPhysics::Solid {
                elastic,
                attenuation,
            } => {
                let u: VectorModes = u
                    .into_iter()
                    .map(|mut m| {
                        let z = m.pop().unwrap_or_default();
                        let p = m.pop().unwrap_or_default();
                        let s = m.pop().unwrap_or_default();
                        [s, p, z]
                    })
                    .collect();
                let strain = self.gradient.grad_vector(ops, &u, nu, nyquist);
                let strain: StrainField = to_batch(&strain);
                let mut stress = elastic.stress(&strain, nr, &ctx.plans)?;
                if let Some(att) = attenuation {
                    att.apply(&strain, &mut stress, advance_attenuation);
                }
                let stress: VoigtModes = from_batch(&stress, npe);
                Ok(ElementForce::Solid(
                    self.gradient.quad_vector(ops, &stress, nu, nyquist),
                ))
            }
            ElementPhysics::Fluid { acoustic } => {
                let chi: ScalarModes = u
                    .into_iter()
                    .map(|mut m| m.pop().unwrap_or_default())
                    .collect();
                let grad = self.gradient.grad_scalar(ops, &chi, nu, nyquist);
                let grad: GradField = to_batch(&grad);
                let sigma = acoustic.stress(&grad, nr, &ctx.plans)?;
                let sigma: VectorModes = from_batch(&sigma, npe);
                Ok(ElementForce::Fluid(
                    self.gradient.quad_scalar(ops, &sigma, nu, nyquist),
                ))
            }
        }
    }

    /// Subtract elemental forces from the point force accumulators
    pub fn scatter(&self, force: &ElementForce, points: &mut [DomainPoint]) -> Result<()> {
        let npe = self.gradient.npe();
        for (node, &idx) in self.points.iter().enumerate() {
            let (i, j) = (node / npe, node % npe);
            let part = if self.is_fluid() {
                points[idx].fluid_mut()
            } else {
                points[idx].solid_mut()
            };
            let p = part.ok_or_else(|| {
                SolverError::MalformedMesh(format!(
                    "element {} touches point {} of the other medium",
                    self.tag, idx
                ))
            })?;
            match force {
                ElementForce::Solid(f) => {
                    for (m, comps) in f.iter().enumerate() {
                        for (k, c) in comps.iter().enumerate() {
                            p.stiff[[m, k]] -= c[[i, j]];
                        }
                    }
                }
                ElementForce::Fluid(f) => {
                    for (m, c) in f.iter().enumerate() {
                        p.stiff[[m, 0]] -= c[[i, j]];
                    }
                }
            }
        }
        Ok(())
    }

    /// Element share of the time-centred energy
    ///
    /// Returns `(dᴴ K d, v_hᴴ K d)` with `v_h = v + dt/2 a`, summed over modes
    /// with their Parseval weights.
    pub fn energy_terms(
        &mut self,
        points: &[DomainPoint],
        ctx: &SpectralContext,
        dt: f64,
    ) -> Result<(f64, f64)> {
        let displ = self.gather(points, Field::Displ)?;
        let veloc = self.gather(points, Field::Veloc)?;
        let accel = self.gather(points, Field::Accel)?;
        let force = components(self.forces_from(displ.clone(), ctx, false)?);

        let (mut potential, mut cross) = (0.0, 0.0);
        for m in 0..force.len() {
            let w = mode_weight(m, self.nr);
            for k in 0..force[m].len() {
                let f = &force[m][k];
                let d = &displ[m][k];
                let vh = &veloc[m][k] + &(&accel[m][k] * (0.5 * dt));
                potential += w * inner(d, f);
                cross += w * inner(&vh, f);
            }
        }
        Ok((potential, cross))
    }

    /// Elemental K·v_h with `v_h = v + dt/2 a`; memory variables untouched
    pub fn half_step_forces(
        &mut self,
        points: &[DomainPoint],
        ctx: &SpectralContext,
        dt: f64,
    ) -> Result<ElementForce> {
        let vh = self.half_step_field(points, dt)?;
        self.forces_from(vh, ctx, false)
    }

    /// `v_hᴴ K v_h`, summed over modes with their Parseval weights
    pub fn half_step_stiffness(
        &mut self,
        points: &[DomainPoint],
        ctx: &SpectralContext,
        dt: f64,
    ) -> Result<f64> {
        let vh = self.half_step_field(points, dt)?;
        let force = components(self.forces_from(vh.clone(), ctx, false)?);
        let mut sum = 0.0;
        for (m, (f, v)) in force.iter().zip(&vh).enumerate() {
            let w = mode_weight(m, self.nr);
            sum += w * f.iter().zip(v).map(|(f, v)| inner(v, f)).sum::<f64>();
        }
        Ok(sum)
    }

    fn half_step_field(&self, points: &[DomainPoint], dt: f64) -> Result<Vec<Vec<CMat>>> {
        let veloc = self.gather(points, Field::Veloc)?;
        let accel = self.gather(points, Field::Accel)?;
        Ok(veloc
            .into_iter()
            .zip(accel)
            .map(|(v, a)| {
                v.into_iter()
                    .zip(a)
                    .map(|(v, a)| v + a.mapv(|x| x * (0.5 * dt)))
                    .collect()
            })
            .collect())
    }

    /// Mean time of one force evaluation over `count` runs
    pub fn measure(&mut self, points: &[DomainPoint], ctx: &SpectralContext, count: usize) -> Result<f64> {
        let start = Instant::now();
        for _ in 0..count {
            self.compute_forces(points, ctx, false)?;
        }
        Ok(start.elapsed().as_secs_f64() / count.max(1) as f64)
    }
}

fn components(force: ElementForce) -> Vec<Vec<CMat>> {
    match force {
        ElementForce::Solid(f) => f.into_iter().map(|m| m.to_vec()).collect(),
        ElementForce::Fluid(f) => f.into_iter().map(|m| vec![m]).collect(),
    }
}

fn inner(a: &CMat, b: &CMat) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x.conj() * y).re).sum()
}

/// Per-mode element matrices to one (nmodes, npe²) matrix per component
fn to_batch<const N: usize>(modes: &[[CMat; N]]) -> [ModeField; N] {
    let nmodes = modes.len();
    let npe = modes[0][0].nrows();
    std::array::from_fn(|k| {
        Array2::from_shape_fn((nmodes, npe * npe), |(m, node)| {
            modes[m][k][[node / npe, node % npe]]
        })
    })
}

fn from_batch<const N: usize>(batch: &[ModeField; N], npe: usize) -> Vec<[CMat; N]> {
    let nmodes = batch[0].nrows();
    (0..nmodes)
        .map(|m| {
            std::array::from_fn(|k| {
                Array2::from_shape_fn((npe, npe), |(i, j)| batch[k][[m, i * npe + j]])
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{GeometricFactors, QuadMap};
    use approx::assert_relative_eq;

    fn solid_element(ctx: &SpectralContext, nr: usize) -> (Element, Vec<DomainPoint>) {
        let npe = ctx.npe();
        let map = QuadMap::new([[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0]]);
        let factors = GeometricFactors::new(&map, &ctx.gll, &ctx.gll, false).unwrap();
        let integral = Array2::from_shape_fn((1, npe * npe), |(_, n)| factors.integral[[n / npe, n % npe]]);
        let elastic = Elastic::Isotropic {
            lambda: Array2::from_elem((1, npe * npe), 2.0),
            mu: Array2::from_elem((1, npe * npe), 1.0),
        }
        .scaled(integral.row(0));
        let points: Vec<DomainPoint> = (0..npe * npe)
            .map(|n| {
                let c = factors.coords[[n / npe, n % npe]];
                DomainPoint::Solid(Point::new(n, c, nr, 3, false))
            })
            .collect();
        let element = Element::new(
            0,
            (0..npe * npe).collect(),
            Gradient::new(factors, false),
            ElementPhysics::Solid {
                elastic,
                attenuation: None,
            },
            nr,
            ctx,
        )
        .unwrap();
        (element, points)
    }

    #[test]
    fn test_rigid_motion_has_no_force() {
        let ctx = SpectralContext::init(3, 4).unwrap();
        let (mut e, mut points) = solid_element(&ctx, 4);
        for p in points.iter_mut() {
            if let Some(s) = p.solid_mut() {
                s.displ[[0, 2]] = Complex64::new(1.0, 0.0);
            }
        }
        let force = e.compute_forces(&points, &ctx, true).unwrap();
        e.scatter(&force, &mut points).unwrap();
        for p in &points {
            assert!(p.solid().unwrap().stiff.iter().all(|c| c.norm() < 1e-10));
        }
    }

    #[test]
    fn test_stiffness_is_positive() {
        let ctx = SpectralContext::init(3, 4).unwrap();
        let (mut e, mut points) = solid_element(&ctx, 4);
        for (n, p) in points.iter_mut().enumerate() {
            if let Some(s) = p.solid_mut() {
                s.displ[[1, 0]] = Complex64::new((n as f64 * 0.37).sin(), 0.2);
                s.displ[[0, 0]] = Complex64::new((n as f64 * 0.91).cos(), 0.0);
            }
        }
        let (potential, _) = e.energy_terms(&points, &ctx, 0.0).unwrap();
        assert!(potential > 0.0);
    }

    #[test]
    fn test_attenuation_on_3d_material_rejected() {
        let ctx = SpectralContext::init(2, 4).unwrap();
        let npe = ctx.npe();
        let map = QuadMap::new([[1.0, 0.0], [2.0, 0.0], [2.0, 1.0], [1.0, 1.0]]);
        let factors = GeometricFactors::new(&map, &ctx.gll, &ctx.gll, false).unwrap();
        let elastic = Elastic::Isotropic {
            lambda: Array2::from_elem((4, npe * npe), 1.0),
            mu: Array2::from_elem((4, npe * npe), 1.0),
        };
        let shear = elastic.shear_modulus();
        let err = Element::new(
            5,
            (0..npe * npe).collect(),
            Gradient::new(factors, false),
            ElementPhysics::Solid {
                elastic,
                attenuation: Some(Attenuation::standard_linear_solid(0.1, &[1.0], 100.0, &shear)),
            },
            4,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::UnsupportedMaterial { element: 5, .. }));
    }

    #[test]
    fn test_batch_layout() {
        let m: Vec<[CMat; 1]> = (0..2)
            .map(|m| [Array2::from_shape_fn((2, 2), |(i, j)| Complex64::new((m * 4 + i * 2 + j) as f64, 0.0))])
            .collect();
        let b = to_batch(&m);
        assert_relative_eq!(b[0][[1, 3]].re, 7.0);
        let back = from_batch(&b, 2);
        assert_eq!(back[1][0], m[1][0]);
    }
}
