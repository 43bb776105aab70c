//! Source time functions
//!
//! A source time function is a sampled series, one value per time step,
//! built from a half duration and shifted so that it starts near zero.

use serde::{Deserialize, Serialize};

/// Decay of the Gaussian pulses
pub const DEFAULT_DECAY: f64 = 1.628;

/// Pulse shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StfKind {
    /// Gaussian pulse
    Gauss,
    /// Second derivative of the Gaussian
    Ricker,
    /// Smoothed step, the integral of the Gaussian
    Erf,
}

/// Sampled source time function
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTimeFunction {
    values: Vec<f64>,
    dt: f64,
    shift: f64,
}

impl SourceTimeFunction {
    pub fn new(values: Vec<f64>, dt: f64, shift: f64) -> Self {
        Self { values, dt, shift }
    }

    /// Build a pulse of `kind`; half durations below `5 dt` are raised to `5 dt`
    pub fn build(kind: StfKind, dt: f64, nsteps: usize, half_duration: f64, decay: f64) -> Self {
        let min_hdur = 5.0 * dt;
        let hdur = if half_duration < min_hdur {
            log::warn!(
                "Half duration {:.4e} s is below 5 dt, using {:.4e} s",
                half_duration,
                min_hdur
            );
            min_hdur
        } else {
            half_duration
        };
        let shift = 1.5 * hdur;
        let a = decay / hdur;
        let gauss = |t: f64| a / std::f64::consts::PI.sqrt() * (-(a * (t - shift)).powi(2)).exp();

        let values = match kind {
            StfKind::Gauss => (0..nsteps).map(|n| gauss(n as f64 * dt)).collect(),
            StfKind::Ricker => (0..nsteps)
                .map(|n| {
                    let x = a * (n as f64 * dt - shift);
                    // -d²/dt² of the Gaussian, positive central lobe
                    -gauss(n as f64 * dt) * a * a * (4.0 * x * x - 2.0)
                })
                .collect(),
            StfKind::Erf => {
                let mut acc = 0.0;
                let mut prev = gauss(0.0);
                (0..nsteps)
                    .map(|n| {
                        if n > 0 {
                            let g = gauss(n as f64 * dt);
                            acc += 0.5 * (prev + g) * dt;
                            prev = g;
                        }
                        acc
                    })
                    .collect()
            }
        };
        Self { values, dt, shift }
    }

    /// Unit value at one step, zero elsewhere
    pub fn impulse(step: usize, dt: f64, nsteps: usize) -> Self {
        let mut values = vec![0.0; nsteps.max(step + 1)];
        values[step] = 1.0;
        Self {
            values,
            dt,
            shift: step as f64 * dt,
        }
    }

    /// Value at a time step, zero past the end of the series
    pub fn value(&self, step: usize) -> f64 {
        self.values.get(step).copied().unwrap_or(0.0)
    }

    /// Cut the series to at most `max_steps` values
    pub fn truncate(&mut self, max_steps: usize) {
        self.values.truncate(max_steps);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn verbose(&self) -> String {
        format!(
            "Source time function: {} samples, dt = {:.4e} s, shift = {:.4e} s",
            self.values.len(),
            self.dt,
            self.shift
        )
    }
}
