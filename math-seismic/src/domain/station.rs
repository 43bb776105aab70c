//! Seismogram recording
//!
//! A station sits at (s, z, φ). Its fields are interpolated in the meridian
//! plane with the element's Lagrange basis and synthesized at φ from the
//! Fourier modes. Records are buffered and handed to a sink in batches.

use crate::element::Element;
use crate::error::Result;
use crate::point::{DomainPoint, mode_weight};
use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Station location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSpec {
    pub name: String,
    pub s: f64,
    pub z: f64,
    #[serde(default)]
    pub phi: f64,
}

/// One sample: displacement (s, φ, z), or (χ, 0, 0) in a fluid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub step: usize,
    pub time: f64,
    pub values: [f64; 3],
}

/// Destination of station records
pub trait StationSink: Send {
    fn write(&mut self, station: &str, records: &[StationRecord]) -> Result<()>;
}

/// Sink that keeps every record in memory; clones share the storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<BTreeMap<String, Vec<StationRecord>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn snapshot(&self) -> BTreeMap<String, Vec<StationRecord>> {
        match self.records.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn station(&self, name: &str) -> Vec<StationRecord> {
        self.snapshot().remove(name).unwrap_or_default()
    }
}

impl StationSink for MemorySink {
    fn write(&mut self, station: &str, records: &[StationRecord]) -> Result<()> {
        let mut map = match self.records.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(station.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }
}

/// A located station with its record buffer
#[derive(Debug, Clone)]
pub struct Station {
    spec: StationSpec,
    /// Local element index
    element: usize,
    /// Lagrange weights at the element nodes, [ξ, η]
    weights: Array2<f64>,
    buffer: Vec<StationRecord>,
}

impl Station {
    pub fn new(spec: StationSpec, element: usize, weights: Array2<f64>) -> Self {
        Self {
            spec,
            element,
            weights,
            buffer: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn element(&self) -> usize {
        self.element
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Interpolate and synthesize the current displacement
    pub fn sample(&self, element: &Element, points: &[DomainPoint]) -> [f64; 3] {
        let npe = self.weights.nrows();
        let nmodes = element.nu() + 1;
        let fluid = element.is_fluid();
        let ncomp = if fluid { 1 } else { 3 };
        let mut modes = Array2::from_elem((nmodes, ncomp), Complex64::new(0.0, 0.0));
        for (node, &idx) in element.points().iter().enumerate() {
            let w = self.weights[[node / npe, node % npe]];
            if w == 0.0 {
                continue;
            }
            let part = if fluid {
                points[idx].fluid()
            } else {
                points[idx].solid()
            };
            if let Some(p) = part {
                for m in 0..nmodes {
                    for k in 0..ncomp {
                        modes[[m, k]] += p.displ[[m, k]] * w;
                    }
                }
            }
        }

        let mut values = [0.0; 3];
        for (m, row) in modes.rows().into_iter().enumerate() {
            let phase = Complex64::from_polar(1.0, m as f64 * self.spec.phi);
            let w = mode_weight(m, element.nr());
            for (k, &c) in row.iter().enumerate() {
                values[k] += w * (c * phase).re;
            }
        }
        values
    }

    pub fn record(&mut self, step: usize, time: f64, element: &Element, points: &[DomainPoint]) {
        let values = self.sample(element, points);
        self.buffer.push(StationRecord { step, time, values });
    }

    pub fn flush(&mut self, sink: &mut dyn StationSink) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        sink.write(&self.spec.name, &self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let mut writer: Box<dyn StationSink> = Box::new(sink.clone());
        let rec = StationRecord {
            step: 1,
            time: 0.1,
            values: [1.0, 2.0, 3.0],
        };
        writer.write("A", &[rec]).unwrap();
        writer.write("A", &[rec]).unwrap();
        assert_eq!(sink.station("A").len(), 2);
        assert!(sink.station("B").is_empty());
    }

    #[test]
    fn test_station_spec_default_phi() {
        let spec: StationSpec = serde_json::from_str(r#"{"name": "S1", "s": 1.0, "z": 2.0}"#).unwrap();
        assert_eq!(spec.phi, 0.0);
    }
}
