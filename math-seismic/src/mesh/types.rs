//! Mesh description in the meridian plane
//!
//! Bilinear quadrilaterals given by four corner nodes in counter-clockwise
//! order, a material table, and side sets naming element edges as
//! `(element, side)` pairs. Side k joins corner k and corner k+1.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Relative velocity perturbation `1 + amplitude * cos(order * φ)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AzimuthalPerturbation {
    pub amplitude: f64,
    pub order: usize,
}

impl AzimuthalPerturbation {
    /// Velocity factor at the `nr` azimuth samples
    pub fn samples(&self, nr: usize) -> Vec<f64> {
        (0..nr)
            .map(|k| {
                let phi = 2.0 * std::f64::consts::PI * k as f64 / nr as f64;
                1.0 + self.amplitude * (self.order as f64 * phi).cos()
            })
            .collect()
    }
}

/// Material description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialSpec {
    Isotropic {
        rho: f64,
        vp: f64,
        vs: f64,
        /// Shear quality factor; attenuation is off when absent
        #[serde(default)]
        q_mu: Option<f64>,
    },
    TransverselyIsotropic {
        rho: f64,
        vpv: f64,
        vph: f64,
        vsv: f64,
        vsh: f64,
        eta: f64,
        /// Angle of the symmetry axis from z, radians
        #[serde(default)]
        tilt: f64,
    },
    Fluid {
        rho: f64,
        vp: f64,
    },
}

impl MaterialSpec {
    pub fn is_fluid(&self) -> bool {
        matches!(self, MaterialSpec::Fluid { .. })
    }

    pub fn density(&self) -> f64 {
        match *self {
            MaterialSpec::Isotropic { rho, .. }
            | MaterialSpec::TransverselyIsotropic { rho, .. }
            | MaterialSpec::Fluid { rho, .. } => rho,
        }
    }

    pub fn max_vp(&self) -> f64 {
        match *self {
            MaterialSpec::Isotropic { vp, .. } | MaterialSpec::Fluid { vp, .. } => vp,
            MaterialSpec::TransverselyIsotropic { vpv, vph, .. } => vpv.max(vph),
        }
    }

    /// Bulk modulus ρ vp² of a fluid (None for solids)
    pub fn kappa(&self) -> Option<f64> {
        match *self {
            MaterialSpec::Fluid { rho, vp } => Some(rho * vp * vp),
            _ => None,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(format!("{} must be positive, got {}", name, v))
            }
        };
        match *self {
            MaterialSpec::Isotropic { rho, vp, vs, q_mu } => {
                positive("rho", rho)?;
                positive("vp", vp)?;
                if vs < 0.0 || vs >= vp {
                    return Err(format!("vs = {} must lie in [0, vp)", vs));
                }
                if let Some(q) = q_mu {
                    positive("q_mu", q)?;
                }
            }
            MaterialSpec::TransverselyIsotropic {
                rho,
                vpv,
                vph,
                vsv,
                vsh,
                eta,
                ..
            } => {
                for (n, v) in [("rho", rho), ("vpv", vpv), ("vph", vph), ("vsv", vsv), ("vsh", vsh), ("eta", eta)] {
                    positive(n, v)?;
                }
            }
            MaterialSpec::Fluid { rho, vp } => {
                positive("rho", rho)?;
                positive("vp", vp)?;
            }
        }
        Ok(())
    }
}

/// One quadrilateral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Corner node indices, counter-clockwise in (s, z)
    pub corners: [usize; 4],
    /// Index into the material table
    pub material: usize,
    /// Azimuthal samples of the element's fields
    pub nr: usize,
    /// Makes the material 3-D
    #[serde(default)]
    pub perturbation: Option<AzimuthalPerturbation>,
}

fn default_dist_tolerance() -> f64 {
    1e-9
}

/// Complete mesh, identical on every rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub nodes: Vec<[f64; 2]>,
    pub elements: Vec<ElementSpec>,
    pub materials: Vec<MaterialSpec>,
    /// Edges on the symmetry axis
    #[serde(default)]
    pub axis: Vec<(usize, usize)>,
    /// Free-surface edges
    #[serde(default)]
    pub surface: Vec<(usize, usize)>,
    /// Interface edges, named from the solid side
    #[serde(default)]
    pub solid_fluid: Vec<(usize, usize)>,
    /// Distance below which two collocation nodes are the same point
    #[serde(default = "default_dist_tolerance")]
    pub dist_tolerance: f64,
}

impl MeshData {
    /// Load a mesh from JSON
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mesh: MeshData = serde_json::from_str(json)?;
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn material(&self, element: usize) -> &MaterialSpec {
        &self.materials[self.elements[element].material]
    }

    pub fn corner_coords(&self, element: usize) -> [[f64; 2]; 4] {
        let c = self.elements[element].corners;
        std::array::from_fn(|k| self.nodes[c[k]])
    }

    /// Corner node indices of one edge
    pub fn edge(&self, element: usize, side: usize) -> [usize; 2] {
        let c = self.elements[element].corners;
        [c[side], c[(side + 1) % 4]]
    }

    pub fn centroid(&self, element: usize) -> [f64; 2] {
        let c = self.corner_coords(element);
        [
            c.iter().map(|p| p[0]).sum::<f64>() / 4.0,
            c.iter().map(|p| p[1]).sum::<f64>() / 4.0,
        ]
    }

    /// Side on the axis, if the element touches it along an edge
    pub fn axis_side(&self, element: usize) -> Option<usize> {
        self.axis.iter().find(|(e, _)| *e == element).map(|&(_, s)| s)
    }

    /// Structural checks; every problem is a `MalformedMesh`
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SolverError::MalformedMesh(msg));
        if self.elements.is_empty() {
            return bad("mesh has no elements".into());
        }
        if self.dist_tolerance.is_nan() || self.dist_tolerance <= 0.0 {
            return bad(format!("dist_tolerance must be positive, got {}", self.dist_tolerance));
        }
        for (i, m) in self.materials.iter().enumerate() {
            if let Err(e) = m.validate() {
                return bad(format!("material {}: {}", i, e));
            }
        }
        for (i, p) in self.nodes.iter().enumerate() {
            if p[0] < -self.dist_tolerance || !p[0].is_finite() || !p[1].is_finite() {
                return bad(format!("node {} at ({}, {}) is outside s >= 0", i, p[0], p[1]));
            }
        }
        for (i, e) in self.elements.iter().enumerate() {
            if let Some(&c) = e.corners.iter().find(|&&c| c >= self.nodes.len()) {
                return bad(format!("element {} references missing node {}", i, c));
            }
            if e.material >= self.materials.len() {
                return bad(format!("element {} references missing material {}", i, e.material));
            }
            if e.nr == 0 {
                return bad(format!("element {} has nr = 0", i));
            }
            let c = self.corner_coords(i);
            let area2: f64 = (0..4)
                .map(|k| {
                    let (a, b) = (c[k], c[(k + 1) % 4]);
                    a[0] * b[1] - b[0] * a[1]
                })
                .sum();
            if area2 <= 0.0 {
                return bad(format!("element {} is not counter-clockwise in (s, z)", i));
            }
        }

        let check_set = |name: &str, set: &[(usize, usize)]| -> Result<()> {
            let mut seen = HashSet::new();
            for &(e, s) in set {
                if e >= self.elements.len() || s > 3 {
                    return bad(format!("{} side set entry ({}, {}) is invalid", name, e, s));
                }
                if !seen.insert((e, s)) {
                    return bad(format!("{} side set lists ({}, {}) twice", name, e, s));
                }
            }
            Ok(())
        };
        check_set("axis", &self.axis)?;
        check_set("surface", &self.surface)?;
        check_set("solid_fluid", &self.solid_fluid)?;

        let mut axial = HashSet::new();
        for &(e, s) in &self.axis {
            if !axial.insert(e) {
                return bad(format!("element {} has more than one axis side", e));
            }
            for n in self.edge(e, s) {
                if self.nodes[n][0].abs() > self.dist_tolerance {
                    return bad(format!("axis side ({}, {}) has node {} off the axis", e, s, n));
                }
            }
        }
        for &(e, s) in &self.solid_fluid {
            if self.material(e).is_fluid() {
                return bad(format!("solid_fluid side ({}, {}) must be named from the solid element", e, s));
            }
        }
        Ok(())
    }
}
