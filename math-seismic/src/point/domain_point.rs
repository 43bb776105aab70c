//! Points owned by a domain, one closed set of kinds

use super::nodal::{Field, Point};
use super::solid_fluid::SolidFluidPoint;
use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;

#[derive(Debug, Clone)]
pub enum DomainPoint {
    Solid(Point),
    Fluid(Point),
    SolidFluid(SolidFluidPoint),
}

impl DomainPoint {
    /// The solid side, if any
    pub fn solid(&self) -> Option<&Point> {
        match self {
            DomainPoint::Solid(p) => Some(p),
            DomainPoint::SolidFluid(sf) => Some(sf.solid()),
            DomainPoint::Fluid(_) => None,
        }
    }

    /// The fluid side, if any
    pub fn fluid(&self) -> Option<&Point> {
        match self {
            DomainPoint::Fluid(p) => Some(p),
            DomainPoint::SolidFluid(sf) => Some(sf.fluid()),
            DomainPoint::Solid(_) => None,
        }
    }

    pub fn solid_mut(&mut self) -> Option<&mut Point> {
        match self {
            DomainPoint::Solid(p) => Some(p),
            DomainPoint::SolidFluid(sf) => Some(sf.solid_mut()),
            DomainPoint::Fluid(_) => None,
        }
    }

    pub fn fluid_mut(&mut self) -> Option<&mut Point> {
        match self {
            DomainPoint::Fluid(p) => Some(p),
            DomainPoint::SolidFluid(sf) => Some(sf.fluid_mut()),
            DomainPoint::Solid(_) => None,
        }
    }

    fn parts(&self) -> Vec<&Point> {
        match self {
            DomainPoint::Solid(p) | DomainPoint::Fluid(p) => vec![p],
            DomainPoint::SolidFluid(sf) => vec![sf.solid(), sf.fluid()],
        }
    }

    fn parts_mut(&mut self) -> Vec<&mut Point> {
        match self {
            DomainPoint::Solid(p) | DomainPoint::Fluid(p) => vec![p],
            DomainPoint::SolidFluid(sf) => {
                let (solid, fluid) = sf.parts_mut();
                vec![solid, fluid]
            }
        }
    }

    pub fn tag(&self) -> usize {
        self.parts()[0].tag
    }

    pub fn coords(&self) -> [f64; 2] {
        self.parts()[0].coords
    }

    pub fn owned(&self) -> bool {
        self.parts()[0].owned
    }

    pub fn set_owned(&mut self, owned: bool) {
        for p in self.parts_mut() {
            p.owned = owned;
        }
    }

    pub fn update_newmark(&mut self, dt: f64) {
        for p in self.parts_mut() {
            p.update_newmark(dt);
        }
    }

    pub fn reset_zero(&mut self) {
        for p in self.parts_mut() {
            p.reset_zero();
        }
    }

    pub fn max_displ(&self) -> f64 {
        let mut max = 0.0f64;
        for p in self.parts() {
            let d = p.max_displ();
            if d.is_nan() {
                return d;
            }
            max = max.max(d);
        }
        max
    }

    pub fn random_displ<R: Rng>(&mut self, factor: f64, rng: &mut R) {
        for p in self.parts_mut() {
            p.random_displ(factor, rng);
        }
    }

    pub fn comm_size(&self) -> usize {
        self.parts().iter().map(|p| p.comm_size()).sum()
    }

    pub fn feed_buffer(&self, buf: &mut Vec<Complex64>) {
        for p in self.parts() {
            p.feed_buffer(buf);
        }
    }

    pub fn extract_buffer(&mut self, buf: &[Complex64]) -> usize {
        let mut offset = 0;
        for p in self.parts_mut() {
            offset += p.extract_buffer(&buf[offset..]);
        }
        offset
    }

    /// Kinetic energy of the solid side; the fluid share comes from its
    /// elements
    pub fn kinetic_energy(&self, dt: f64) -> f64 {
        self.solid().map_or(0.0, |p| p.kinetic_energy(dt))
    }

    /// Fluid load `g = K χ + n·u` left in the fluid accumulator after
    /// assembly, coupled with the solid displacement or half-step velocity
    pub fn fluid_load(&mut self, half_step: Option<f64>) -> Option<Array2<Complex64>> {
        let fluid = match self {
            DomainPoint::Solid(_) => return None,
            DomainPoint::Fluid(p) => {
                if p.axial {
                    Point::mask_axis(&mut p.stiff);
                }
                &*p
            }
            DomainPoint::SolidFluid(sf) => {
                sf.load_fluid_from_solid(half_step);
                sf.fluid()
            }
        };
        Some(fluid.stiff.mapv(|f| -f))
    }

    pub fn clear_stiff(&mut self) {
        for p in self.parts_mut() {
            p.clear_stiff();
        }
    }

    /// Mean time of one update (and coupling) of this point
    pub fn measure(&self, count: usize) -> f64 {
        match self {
            DomainPoint::Solid(p) | DomainPoint::Fluid(p) => p.measure(count),
            DomainPoint::SolidFluid(sf) => {
                sf.solid().measure(count) + sf.fluid().measure(count) + sf.measure_coupling(count)
            }
        }
    }

    pub fn couple_solid_fluid(&mut self) {
        if let DomainPoint::SolidFluid(sf) = self {
            sf.couple();
        }
    }

    /// Field of the part matching `fluid`
    pub fn field(&self, fluid: bool, which: Field) -> Option<&Array2<Complex64>> {
        let part = if fluid { self.fluid() } else { self.solid() };
        part.map(|p| p.field(which))
    }
}
