//! JSON configuration of a simulation run

use crate::domain::{SourceSpec, StationSpec};
use crate::error::{Result, SolverError};
use crate::newmark::Newmark;
use crate::stf::{DEFAULT_DECAY, SourceTimeFunction, StfKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete run configuration; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Polynomial order of the elements
    #[serde(default = "default_npol")]
    pub npol: usize,
    /// Largest azimuth sample count with a transform plan
    #[serde(default = "default_max_nr")]
    pub max_nr: usize,
    /// Time step; estimated from the mesh when absent
    #[serde(default)]
    pub dt: Option<f64>,
    /// Fraction of the estimated stable step used when `dt` is absent
    #[serde(default = "default_courant")]
    pub courant: f64,
    #[serde(default = "default_total_steps")]
    pub total_steps: usize,
    #[serde(default = "default_report_interval")]
    pub report_interval: usize,
    #[serde(default = "default_stability_interval")]
    pub stability_interval: usize,
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
    #[serde(default = "default_record_interval")]
    pub record_interval: usize,
    /// Records buffered per station before a flush
    #[serde(default = "default_dump_interval")]
    pub dump_interval: usize,
    #[serde(default)]
    pub random_init: Option<RandomInitConfig>,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub stations: Vec<StationSpec>,
    /// Relaxation times of the attenuation mechanisms, seconds
    #[serde(default)]
    pub relaxation_times: Vec<f64>,
    /// Same nr for every element instead of the mesh values
    #[serde(default)]
    pub nr_override: Option<usize>,
    /// Runs per kernel when measuring the cost before the time loop; 0 skips it
    #[serde(default)]
    pub measure_cost: usize,
}

/// Small random initial displacement, for stability testing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomInitConfig {
    pub factor: f64,
    #[serde(default)]
    pub seed: u64,
}

/// Point force on the axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_stf_kind")]
    pub kind: StfKind,
    pub half_duration: f64,
    #[serde(default = "default_decay")]
    pub decay: f64,
    pub z: f64,
    /// Cartesian force (x, y, z)
    #[serde(default = "default_force")]
    pub force: [f64; 3],
}

impl SourceConfig {
    /// Sampled source for a run of `nsteps` steps of `dt`
    pub fn to_source(&self, dt: f64, nsteps: usize) -> SourceSpec {
        SourceSpec {
            z: self.z,
            force: self.force,
            stf: SourceTimeFunction::build(self.kind, dt, nsteps, self.half_duration, self.decay),
        }
    }
}

fn default_npol() -> usize {
    4
}

fn default_max_nr() -> usize {
    1
}

fn default_courant() -> f64 {
    0.5
}

fn default_total_steps() -> usize {
    1000
}

fn default_report_interval() -> usize {
    100
}

fn default_stability_interval() -> usize {
    10
}

fn default_stability_threshold() -> f64 {
    1e10
}

fn default_record_interval() -> usize {
    1
}

fn default_dump_interval() -> usize {
    1000
}

fn default_stf_kind() -> StfKind {
    StfKind::Gauss
}

fn default_decay() -> f64 {
    DEFAULT_DECAY
}

fn default_force() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            npol: default_npol(),
            max_nr: default_max_nr(),
            dt: None,
            courant: default_courant(),
            total_steps: default_total_steps(),
            report_interval: default_report_interval(),
            stability_interval: default_stability_interval(),
            stability_threshold: default_stability_threshold(),
            record_interval: default_record_interval(),
            dump_interval: default_dump_interval(),
            random_init: None,
            source: None,
            stations: Vec::new(),
            relaxation_times: Vec::new(),
            nr_override: None,
            measure_cost: 0,
        }
    }
}

impl SolverConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SolverError::Config(msg));
        if !(2..=8).contains(&self.npol) {
            return fail(format!("npol = {} outside 2..=8", self.npol));
        }
        if self.max_nr == 0 {
            return fail("max_nr must be at least 1".into());
        }
        if let Some(dt) = self.dt {
            if !(dt > 0.0 && dt.is_finite()) {
                return fail(format!("dt = {} must be positive", dt));
            }
        }
        if !(self.courant > 0.0 && self.courant <= 1.0) {
            return fail(format!("courant = {} outside (0, 1]", self.courant));
        }
        if self.stability_threshold <= 0.0 {
            return fail("stability_threshold must be positive".into());
        }
        if let Some(nr) = self.nr_override {
            if nr == 0 || nr > self.max_nr {
                return fail(format!("nr_override = {} outside 1..={}", nr, self.max_nr));
            }
        }
        if let Some(src) = &self.source {
            if !(src.half_duration > 0.0) {
                return fail("source half_duration must be positive".into());
            }
        }
        if self.relaxation_times.iter().any(|&t| !(t > 0.0)) {
            return fail("relaxation times must be positive".into());
        }
        Ok(())
    }

    /// Time-loop settings for step `dt`
    pub fn newmark(&self, dt: f64) -> Newmark {
        Newmark {
            dt,
            total_steps: self.total_steps,
            report_interval: self.report_interval,
            stability_interval: self.stability_interval,
            stability_threshold: self.stability_threshold,
            record_interval: self.record_interval,
        }
    }
}
