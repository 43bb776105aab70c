//! Time-loop timers and cost measurement

use std::time::Duration;

/// Parts of a time step timed separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Element forces
    Elements,
    /// Newmark update of the points
    Points,
    /// Packing and posting halo messages
    Assembly,
    /// Waiting for halo messages, unpacking
    Wait,
    /// Solid-fluid coupling
    Coupling,
    /// Sources, stability checks, stations
    Others,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Elements,
        Phase::Points,
        Phase::Assembly,
        Phase::Wait,
        Phase::Coupling,
        Phase::Others,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Elements => "elements",
            Phase::Points => "points",
            Phase::Assembly => "assembly",
            Phase::Wait => "wait",
            Phase::Coupling => "coupling",
            Phase::Others => "others",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Accumulated wall time per phase
#[derive(Debug, Clone, Default)]
pub struct PhaseTimers {
    totals: [Duration; 6],
}

impl PhaseTimers {
    pub fn add(&mut self, phase: Phase, elapsed: Duration) {
        self.totals[phase.index()] += elapsed;
    }

    pub fn get(&self, phase: Phase) -> Duration {
        self.totals[phase.index()]
    }

    pub fn total(&self) -> Duration {
        self.totals.iter().sum()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Measured cost of one rank, seconds per time step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankCost {
    pub solid_elements: f64,
    pub fluid_elements: f64,
    pub points: f64,
}

impl RankCost {
    pub fn total(&self) -> f64 {
        self.solid_elements + self.fluid_elements + self.points
    }
}

/// `max / mean` over ranks, 1 for a balanced load
pub fn imbalance(max: f64, sum: f64, nranks: usize) -> f64 {
    let mean = sum / nranks.max(1) as f64;
    if mean > 0.0 { max / mean } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_accumulate_per_phase() {
        let mut t = PhaseTimers::default();
        t.add(Phase::Wait, Duration::from_millis(3));
        t.add(Phase::Wait, Duration::from_millis(2));
        t.add(Phase::Elements, Duration::from_millis(10));
        assert_eq!(t.get(Phase::Wait), Duration::from_millis(5));
        assert_eq!(t.get(Phase::Points), Duration::ZERO);
        assert_eq!(t.total(), Duration::from_millis(15));
        t.reset();
        assert_eq!(t.total(), Duration::ZERO);
    }

    #[test]
    fn test_imbalance() {
        assert_eq!(imbalance(3.0, 6.0, 3), 1.5);
        assert_eq!(imbalance(0.0, 0.0, 4), 1.0);
    }
}
