//! Explicit time loop
//!
//! One step is, in this fixed order: element forces, source terms, halo
//! assembly, solid-fluid coupling, Newmark update, then the periodic stability
//! check and station recording.

use crate::domain::Domain;
use crate::error::Result;
use std::time::Instant;

/// Time-loop settings
#[derive(Debug, Clone)]
pub struct Newmark {
    pub dt: f64,
    pub total_steps: usize,
    /// Steps between progress reports (0 disables them)
    pub report_interval: usize,
    /// Steps between stability checks (0 disables them)
    pub stability_interval: usize,
    pub stability_threshold: f64,
    /// Steps between station samples (0 disables recording)
    pub record_interval: usize,
}

impl Newmark {
    /// Settings with checks every step and no reporting
    pub fn new(dt: f64, total_steps: usize) -> Self {
        Self {
            dt,
            total_steps,
            report_interval: 0,
            stability_interval: 1,
            stability_threshold: 1e10,
            record_interval: 1,
        }
    }

    /// Time at the end of step `n`
    pub fn time(&self, n: usize) -> f64 {
        (n + 1) as f64 * self.dt
    }

    /// Advance the domain by step `n`
    pub fn step(&self, domain: &mut Domain, n: usize) -> Result<()> {
        domain.compute_stiff()?;
        domain.apply_source(n);
        domain.assemble_stiff()?;
        domain.couple_solid_fluid();
        domain.update_newmark(self.dt);

        let time = self.time(n);
        if self.stability_interval > 0 && (n + 1) % self.stability_interval == 0 {
            domain.check_stability(n, time, self.stability_threshold)?;
        }
        if self.record_interval > 0 && n % self.record_interval == 0 {
            domain.record(n, time)?;
        }
        Ok(())
    }

    fn run(&self, domain: &mut Domain) -> Result<()> {
        let start = Instant::now();
        for n in 0..self.total_steps {
            self.step(domain, n)?;
            if self.report_interval > 0 && (n + 1) % self.report_interval == 0 && domain.rank() == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                log::info!(
                    "Step {}/{} (t = {:.4e} s), elapsed {:.2} s, {:.1} steps/s",
                    n + 1,
                    self.total_steps,
                    self.time(n),
                    elapsed,
                    (n + 1) as f64 / elapsed.max(f64::MIN_POSITIVE)
                );
            }
        }
        domain.dump_left()?;
        let timing = domain.timing_report()?;
        if domain.rank() == 0 {
            log::info!(
                "Time loop finished: {} steps in {:.2} s",
                self.total_steps,
                start.elapsed().as_secs_f64()
            );
            log::info!("{}", timing.trim_end());
        }
        Ok(())
    }

    /// Run every step; any error aborts the whole process group
    pub fn solve(&self, domain: &mut Domain) -> Result<()> {
        self.run(domain).inspect_err(|e| {
            log::error!("Rank {}: {}", domain.rank(), e);
            domain.abort(&e.to_string());
        })
    }
}
