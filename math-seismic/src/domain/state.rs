//! Runtime state of one rank: points, elements, neighbours and I/O

use super::cost::{Phase, PhaseTimers, RankCost, imbalance};
use super::source::SourceTerm;
use super::station::{Station, StationSink};
use crate::comm::{Communicator, MessagingInfo, ReduceOp};
use crate::element::{Element, ElementForce};
use crate::error::{CommError, Result, SolverError};
use crate::point::DomainPoint;
use crate::spectral::SpectralContext;
use ndarray::Array2;
use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Everything one rank integrates in time
pub struct Domain {
    pub(super) ctx: Arc<SpectralContext>,
    pub(super) comm: Box<dyn Communicator>,
    pub(super) points: Vec<DomainPoint>,
    pub(super) elements: Vec<Element>,
    pub(super) messaging: MessagingInfo,
    pub(super) sources: Vec<SourceTerm>,
    pub(super) stations: Vec<Station>,
    pub(super) sink: Option<Box<dyn StationSink>>,
    pub(super) dump_interval: usize,
    pub(super) suggested_dt: f64,
    pub(super) timers: PhaseTimers,
}

#[cfg(feature = "parallel")]
fn element_forces(
    elements: &mut [Element],
    points: &[DomainPoint],
    ctx: &SpectralContext,
) -> Result<Vec<ElementForce>> {
    elements
        .par_iter_mut()
        .map(|e| e.compute_forces(points, ctx, true))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn element_forces(
    elements: &mut [Element],
    points: &[DomainPoint],
    ctx: &SpectralContext,
) -> Result<Vec<ElementForce>> {
    elements
        .iter_mut()
        .map(|e| e.compute_forces(points, ctx, true))
        .collect()
}

impl Domain {
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn points(&self) -> &[DomainPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [DomainPoint] {
        &mut self.points
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn messaging(&self) -> &MessagingInfo {
        &self.messaging
    }

    pub fn sources(&self) -> &[SourceTerm] {
        &self.sources
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn context(&self) -> &SpectralContext {
        &self.ctx
    }

    /// Largest stable time step of the whole mesh at Courant number 1
    pub fn suggested_dt(&self) -> f64 {
        self.suggested_dt
    }

    /// Local index of the point with global tag `tag`
    pub fn find_point(&self, tag: usize) -> Option<usize> {
        self.points.binary_search_by_key(&tag, |p| p.tag()).ok()
    }

    /// Wall time spent so far in each phase of the time loop
    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    /// Element forces, subtracted into the point accumulators
    pub fn compute_stiff(&mut self) -> Result<()> {
        let start = Instant::now();
        let forces = element_forces(&mut self.elements, &self.points, &self.ctx)?;
        for (element, force) in self.elements.iter().zip(&forces) {
            element.scatter(force, &mut self.points)?;
        }
        self.timers.add(Phase::Elements, start.elapsed());
        Ok(())
    }

    /// Add source forces for `step`
    pub fn apply_source(&mut self, step: usize) {
        let start = Instant::now();
        for source in &self.sources {
            source.apply(step, &mut self.points);
        }
        self.timers.add(Phase::Others, start.elapsed());
    }

    /// Sum the force accumulators of shared points over all ranks
    ///
    /// All sends go out before any receive completes, so the exchange cannot
    /// deadlock whatever the neighbour order.
    pub fn assemble_stiff(&mut self) -> Result<()> {
        let (post, wait) = self.exchange_stiff()?;
        self.timers.add(Phase::Assembly, post);
        self.timers.add(Phase::Wait, wait);
        Ok(())
    }

    /// Halo exchange of the force accumulators, returning the time spent
    /// posting and the time spent waiting
    fn exchange_stiff(&mut self) -> Result<(Duration, Duration)> {
        if self.messaging.is_empty() {
            return Ok((Duration::ZERO, Duration::ZERO));
        }
        let start = Instant::now();
        let mut expected = Vec::with_capacity(self.messaging.links.len());
        for link in &self.messaging.links {
            let mut buf = Vec::new();
            for &p in &link.points {
                self.points[p].feed_buffer(&mut buf);
            }
            expected.push(buf.len());
            self.comm.isend(link.rank, buf)?;
            self.comm.irecv(link.rank, expected[expected.len() - 1])?;
        }
        let post = start.elapsed();
        let start = Instant::now();
        let received = self.comm.wait_all()?;
        for ((link, buf), &len) in self.messaging.links.iter().zip(&received).zip(&expected) {
            if buf.len() != len {
                return Err(CommError::BufferSize {
                    peer: link.rank,
                    expected: len,
                    actual: buf.len(),
                }
                .into());
            }
            let mut offset = 0;
            for &p in &link.points {
                offset += self.points[p].extract_buffer(&buf[offset..]);
            }
        }
        Ok((post, start.elapsed()))
    }

    pub fn couple_solid_fluid(&mut self) {
        let start = Instant::now();
        for p in &mut self.points {
            p.couple_solid_fluid();
        }
        self.timers.add(Phase::Coupling, start.elapsed());
    }

    pub fn update_newmark(&mut self, dt: f64) {
        let start = Instant::now();
        for p in &mut self.points {
            p.update_newmark(dt);
        }
        self.timers.add(Phase::Points, start.elapsed());
    }

    /// Collective check of the displacement magnitude
    ///
    /// Fails on every rank with the same step when any rank holds a NaN or a
    /// value above `threshold`.
    pub fn check_stability(&mut self, step: usize, time: f64, threshold: f64) -> Result<()> {
        let start = Instant::now();
        let result = self.stability(step, time, threshold);
        self.timers.add(Phase::Others, start.elapsed());
        result
    }

    fn stability(&self, step: usize, time: f64, threshold: f64) -> Result<()> {
        let (mut local_max, mut worst) = (0.0f64, None);
        for p in &self.points {
            let d = p.max_displ();
            if d.is_nan() || d > local_max {
                local_max = d;
                worst = Some(p);
                if d.is_nan() {
                    break;
                }
            }
        }
        let global_max = self.comm.reduce(local_max, ReduceOp::Max)?;
        if global_max.is_nan() || global_max > threshold {
            let unstable = local_max.is_nan() || local_max > threshold;
            let location = worst.filter(|_| unstable).map(|p| {
                let [s, z] = p.coords();
                format!(
                    "point {} at (s, z) = ({:.6e}, {:.6e}) on rank {}, |u| = {:.3e}",
                    p.tag(),
                    s,
                    z,
                    self.rank(),
                    local_max
                )
            });
            if let Some(loc) = &location {
                log::error!("Instability at step {}: {}", step, loc);
            }
            return Err(SolverError::Diverged {
                step,
                time,
                location,
            });
        }
        Ok(())
    }

    /// Sample every station, flushing buffers that reach the dump interval
    pub fn record(&mut self, step: usize, time: f64) -> Result<()> {
        let start = Instant::now();
        for station in &mut self.stations {
            let element = &self.elements[station.element()];
            station.record(step, time, element, &self.points);
            if station.buffered() >= self.dump_interval {
                if let Some(sink) = self.sink.as_deref_mut() {
                    station.flush(sink)?;
                }
            }
        }
        self.timers.add(Phase::Others, start.elapsed());
        Ok(())
    }

    /// Flush whatever the stations still buffer
    pub fn dump_left(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_deref_mut() {
            for station in &mut self.stations {
                station.flush(sink)?;
            }
        }
        Ok(())
    }

    /// Tiny random displacement everywhere, reproducible across partitions
    ///
    /// Each point draws from a generator seeded with its global tag, so
    /// copies of a shared point on different ranks get the same values.
    pub fn init_displ_tiny_random(&mut self, factor: f64, seed: u64) {
        for p in &mut self.points {
            let mixed = seed ^ (p.tag() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let mut rng = StdRng::seed_from_u64(mixed);
            p.random_displ(factor, &mut rng);
        }
    }

    /// Total energy, conserved by the time scheme in the absence of sources
    ///
    /// Solids contribute `½ Mₛ|v_h|² + ½ uᴴ Kₛ u - dt/2 v_hᴴ Kₛ u` with
    /// `v_h = v + dt/2 a`. Fluids contribute their kinetic share
    /// `½ v_hᴴ K_f v_h` and the pressure share `½ gᴴ M_f⁻¹ g` of the load
    /// `g = K_f χ + n·u`, which holds the solid-fluid interface term.
    /// Collective over the group.
    pub fn total_energy(&mut self, dt: f64) -> Result<f64> {
        let mut kinetic: f64 = self
            .points
            .iter()
            .filter(|p| p.owned())
            .map(|p| p.kinetic_energy(dt))
            .sum();
        let (mut potential, mut cross) = (0.0, 0.0);
        let mut fluid = false;
        for element in &mut self.elements {
            if element.is_fluid() {
                fluid = true;
                kinetic += 0.5 * element.half_step_stiffness(&self.points, &self.ctx, dt)?;
            } else {
                let (pot, cr) = element.energy_terms(&self.points, &self.ctx, dt)?;
                potential += pot;
                cross += cr;
            }
        }
        // the pressure terms need a halo exchange, so every rank joins in
        let any_fluid = self.comm.reduce(if fluid { 1.0 } else { 0.0 }, ReduceOp::Max)?;
        if any_fluid > 0.0 {
            let (pot, cr) = self.pressure_energy(dt)?;
            potential += pot;
            cross += cr;
        }
        let local = kinetic + 0.5 * potential - 0.5 * dt * cross;
        Ok(self.comm.reduce(local, ReduceOp::Sum)?)
    }

    fn pressure_energy(&mut self, dt: f64) -> Result<(f64, f64)> {
        let g_d = self.fluid_loads(None)?;
        let g_h = self.fluid_loads(Some(dt))?;
        let (mut potential, mut cross) = (0.0, 0.0);
        for ((p, d), h) in self.points.iter().zip(&g_d).zip(&g_h) {
            if !p.owned() {
                continue;
            }
            if let (Some(fluid), Some(d), Some(h)) = (p.fluid(), d.as_ref(), h.as_ref()) {
                let (pot, cr) = fluid.pressure_terms(d, h);
                potential += pot;
                cross += cr;
            }
        }
        Ok((potential, cross))
    }

    /// Assembled fluid loads from the displacement, or from the half-step
    /// velocity; the force accumulators are cleared afterwards
    fn fluid_loads(&mut self, half_step: Option<f64>) -> Result<Vec<Option<Array2<Complex64>>>> {
        let mut forces = Vec::new();
        for (i, element) in self.elements.iter_mut().enumerate() {
            if !element.is_fluid() {
                continue;
            }
            let force = match half_step {
                Some(dt) => element.half_step_forces(&self.points, &self.ctx, dt)?,
                None => element.compute_forces(&self.points, &self.ctx, false)?,
            };
            forces.push((i, force));
        }
        for (i, force) in &forces {
            self.elements[*i].scatter(force, &mut self.points)?;
        }
        self.exchange_stiff()?;
        let loads = self.points.iter_mut().map(|p| p.fluid_load(half_step)).collect();
        for p in &mut self.points {
            p.clear_stiff();
        }
        Ok(loads)
    }

    /// Measure the per-step cost of this rank's elements and points
    ///
    /// Each kernel runs `count` times on the current state, which is left
    /// unchanged. Collective: returns the group summary.
    pub fn report_cost(&mut self, count: usize) -> Result<String> {
        let mut cost = RankCost::default();
        for element in &mut self.elements {
            let t = element.measure(&self.points, &self.ctx, count)?;
            if element.is_fluid() {
                cost.fluid_elements += t;
            } else {
                cost.solid_elements += t;
            }
        }
        cost.points = self.points.iter().map(|p| p.measure(count)).sum();

        let size = self.size();
        let mut out = format!("Measured cost per step over {} ranks (sum / max):\n", size);
        for (name, value) in [
            ("solid elements", cost.solid_elements),
            ("fluid elements", cost.fluid_elements),
            ("points", cost.points),
        ] {
            let sum = self.comm.reduce(value, ReduceOp::Sum)?;
            let max = self.comm.reduce(value, ReduceOp::Max)?;
            out.push_str(&format!("  {:<15} {:.3e} s / {:.3e} s\n", name, sum, max));
        }
        let sum = self.comm.reduce(cost.total(), ReduceOp::Sum)?;
        let max = self.comm.reduce(cost.total(), ReduceOp::Max)?;
        out.push_str(&format!(
            "  rank {}: {:.3e} s, load imbalance {:.2}\n",
            self.rank(),
            cost.total(),
            imbalance(max, sum, size)
        ));
        Ok(out)
    }

    /// Collective summary of the time-loop timers
    pub fn timing_report(&self) -> Result<String> {
        let size = self.size();
        let mut out = format!("Time loop over {} ranks (mean / max seconds):\n", size);
        for phase in Phase::ALL {
            let t = self.timers.get(phase).as_secs_f64();
            let sum = self.comm.reduce(t, ReduceOp::Sum)?;
            let max = self.comm.reduce(t, ReduceOp::Max)?;
            out.push_str(&format!(
                "  {:<9} {:10.3} / {:10.3}\n",
                phase.name(),
                sum / size as f64,
                max
            ));
        }
        let total = self.timers.total().as_secs_f64();
        let sum = self.comm.reduce(total, ReduceOp::Sum)?;
        let max = self.comm.reduce(total, ReduceOp::Max)?;
        out.push_str(&format!("  imbalance {:.2}\n", imbalance(max, sum, size)));
        Ok(out)
    }

    /// Global element count, point count and nr histogram
    pub fn verbose(&self) -> Result<String> {
        let elements = self.comm.reduce(self.elements.len() as f64, ReduceOp::Sum)?;
        let owned = self.points.iter().filter(|p| p.owned()).count();
        let points = self.comm.reduce(owned as f64, ReduceOp::Sum)?;
        let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
        for e in &self.elements {
            *histogram.entry(e.nr()).or_default() += 1;
        }
        let nr_max = histogram.keys().next_back().copied().unwrap_or(0);
        let nr_max = self.comm.reduce(nr_max as f64, ReduceOp::Max)?;
        let mut out = format!(
            "Domain: {} elements, {} points, {} ranks, nr <= {}\n",
            elements as usize,
            points as usize,
            self.size(),
            nr_max as usize
        );
        for (nr, count) in &histogram {
            out.push_str(&format!("  rank {}: {} elements with nr = {}\n", self.rank(), count, nr));
        }
        Ok(out)
    }

    pub fn reset_zero(&mut self) {
        for p in &mut self.points {
            p.reset_zero();
        }
    }

    /// Abort the whole process group
    pub fn abort(&self, reason: &str) {
        self.comm.abort(reason);
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("rank", &self.rank())
            .field("points", &self.points.len())
            .field("elements", &self.elements.len())
            .field("sources", &self.sources.len())
            .field("stations", &self.stations.len())
            .finish()
    }
}
