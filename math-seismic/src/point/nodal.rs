//! Global collocation point
//!
//! A point carries every Fourier mode of its fields as rows of a
//! `(nu + 1, ncomp)` matrix: three components `(s, φ, z)` in a solid, the
//! potential χ in a fluid.

use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;
use std::time::Instant;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Selects one of the point fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Displ,
    Veloc,
    Accel,
    Stiff,
}

/// Weight of mode `m` in Parseval sums over `nr` samples
#[inline]
pub fn mode_weight(m: usize, nr: usize) -> f64 {
    if m == 0 || (nr % 2 == 0 && 2 * m == nr) {
        1.0
    } else {
        2.0
    }
}

/// Point of a solid or fluid medium
#[derive(Debug, Clone)]
pub struct Point {
    /// Global tag, identical on every rank sharing the point
    pub tag: usize,
    /// Meridian coordinates (s, z)
    pub coords: [f64; 2],
    /// On the symmetry axis
    pub axial: bool,
    /// This rank is the lowest rank sharing the point
    pub owned: bool,
    nr: usize,
    pub displ: Array2<Complex64>,
    pub veloc: Array2<Complex64>,
    pub accel: Array2<Complex64>,
    pub stiff: Array2<Complex64>,
    pub inv_mass: f64,
}

impl Point {
    pub fn new(tag: usize, coords: [f64; 2], nr: usize, ncomp: usize, axial: bool) -> Self {
        let shape = (nr / 2 + 1, ncomp);
        Self {
            tag,
            coords,
            axial,
            owned: true,
            nr,
            displ: Array2::from_elem(shape, ZERO),
            veloc: Array2::from_elem(shape, ZERO),
            accel: Array2::from_elem(shape, ZERO),
            stiff: Array2::from_elem(shape, ZERO),
            inv_mass: 0.0,
        }
    }

    pub fn nr(&self) -> usize {
        self.nr
    }

    pub fn nu(&self) -> usize {
        self.nr / 2
    }

    pub fn ncomp(&self) -> usize {
        self.displ.ncols()
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
    }

    pub fn field(&self, which: Field) -> &Array2<Complex64> {
        match which {
            Field::Displ => &self.displ,
            Field::Veloc => &self.veloc,
            Field::Accel => &self.accel,
            Field::Stiff => &self.stiff,
        }
    }

    /// Project a field onto the admissible axis modes
    ///
    /// Solids keep u_z in mode 0 and u_φ = i u_s in mode 1; fluids keep mode 0.
    pub fn mask_axis(field: &mut Array2<Complex64>) {
        let ncomp = field.ncols();
        for (m, mut row) in field.rows_mut().into_iter().enumerate() {
            if ncomp == 1 {
                if m > 0 {
                    row.fill(ZERO);
                }
                continue;
            }
            match m {
                0 => {
                    row[0] = ZERO;
                    row[1] = ZERO;
                }
                1 => {
                    let s = (row[0] - I * row[1]) * 0.5;
                    row[0] = s;
                    row[1] = I * s;
                    row[2] = ZERO;
                }
                _ => row.fill(ZERO),
            }
        }
    }

    /// One explicit Newmark step (velocity Verlet form) from the assembled force
    pub fn update_newmark(&mut self, dt: f64) {
        if self.axial {
            Self::mask_axis(&mut self.stiff);
        }
        let inv_mass = self.inv_mass;
        let half_dt = 0.5 * dt;
        let half_dt2 = 0.5 * dt * dt;
        ndarray::Zip::from(&mut self.displ)
            .and(&mut self.veloc)
            .and(&mut self.accel)
            .and(&self.stiff)
            .for_each(|d, v, a, &f| {
                let a_new = f * inv_mass;
                *v += (*a + a_new) * half_dt;
                *a = a_new;
                *d += *v * dt + a_new * half_dt2;
            });
        self.stiff.fill(ZERO);
    }

    /// `v + dt/2 a`, the velocity at the middle of the last step
    pub fn half_step_veloc(&self, dt: f64) -> Array2<Complex64> {
        &self.veloc + &self.accel.mapv(|a| a * (0.5 * dt))
    }

    pub fn clear_stiff(&mut self) {
        self.stiff.fill(ZERO);
    }

    /// Mean time of one Newmark update over `count` runs on a scratch copy
    pub fn measure(&self, count: usize) -> f64 {
        let mut scratch = self.clone();
        let start = Instant::now();
        for _ in 0..count {
            scratch.update_newmark(0.0);
        }
        start.elapsed().as_secs_f64() / count.max(1) as f64
    }

    pub fn reset_zero(&mut self) {
        for f in [&mut self.displ, &mut self.veloc, &mut self.accel, &mut self.stiff] {
            f.fill(ZERO);
        }
    }

    /// Largest displacement modulus, NaN if any entry is NaN
    pub fn max_displ(&self) -> f64 {
        let mut max = 0.0f64;
        for c in self.displ.iter() {
            let n = c.norm();
            if n.is_nan() {
                return f64::NAN;
            }
            max = max.max(n);
        }
        max
    }

    /// Fill the displacement with small random values (mode 0 stays real)
    pub fn random_displ<R: Rng>(&mut self, factor: f64, rng: &mut R) {
        for (m, mut row) in self.displ.rows_mut().into_iter().enumerate() {
            for c in row.iter_mut() {
                let re = rng.random_range(-1.0..1.0) * factor;
                let im = if m == 0 { 0.0 } else { rng.random_range(-1.0..1.0) * factor };
                *c = Complex64::new(re, im);
            }
        }
        if self.axial {
            Self::mask_axis(&mut self.displ);
        }
    }

    /// Values exchanged during assembly
    pub fn comm_size(&self) -> usize {
        self.stiff.len()
    }

    pub fn feed_buffer(&self, buf: &mut Vec<Complex64>) {
        buf.extend(self.stiff.iter().copied());
    }

    /// Add received force values, returning how many were consumed
    pub fn extract_buffer(&mut self, buf: &[Complex64]) -> usize {
        let n = self.comm_size();
        for (s, &r) in self.stiff.iter_mut().zip(&buf[..n]) {
            *s += r;
        }
        n
    }

    /// Fluid pressure terms of the time-centred energy
    ///
    /// With `g = K χ + n·u` assembled at this point, returns
    /// `(Σ_m w_m |g_d|² / M, Σ_m w_m Re(g_hᴴ g_d) / M)` for the displacement and
    /// half-step velocity loads.
    pub fn pressure_terms(&self, g_d: &Array2<Complex64>, g_h: &Array2<Complex64>) -> (f64, f64) {
        let (mut potential, mut cross) = (0.0, 0.0);
        for (m, (d, h)) in g_d.rows().into_iter().zip(g_h.rows()).enumerate() {
            let w = mode_weight(m, self.nr) * self.inv_mass;
            for (&di, &hi) in d.iter().zip(h.iter()) {
                potential += w * di.norm_sqr();
                cross += w * (hi.conj() * di).re;
            }
        }
        (potential, cross)
    }

    /// ½ Σ_m w_m M |v + dt/2 a|², the kinetic part of the time-centred energy
    pub fn kinetic_energy(&self, dt: f64) -> f64 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        let mass = 1.0 / self.inv_mass;
        let mut sum = 0.0;
        for (m, (v, a)) in self.veloc.rows().into_iter().zip(self.accel.rows()).enumerate() {
            let w = mode_weight(m, self.nr);
            for (&vi, &ai) in v.iter().zip(a.iter()) {
                sum += w * (vi + ai * (0.5 * dt)).norm_sqr();
            }
        }
        0.5 * mass * sum
    }
}
