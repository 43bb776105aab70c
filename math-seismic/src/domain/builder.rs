//! Domain construction from the global mesh
//!
//! Every rank sees the whole mesh. Global quantities (point numbering, mass,
//! interface normals, ownership) are computed from all elements so that ranks
//! sharing a point agree on them exactly; only the elements of this rank are
//! then instantiated.

use super::cost::PhaseTimers;
use super::policy::{MeshNr, ModeTruncation};
use super::source::{SourceSpec, SourceTerm};
use super::state::Domain;
use super::station::{Station, StationSink, StationSpec};
use crate::comm::{Communicator, MessagingInfo, NeighbourLink};
use crate::element::{Element, ElementPhysics, GeometricFactors, Gradient, QuadMap};
use crate::error::{Result, SolverError};
use crate::material::{Acoustic, Attenuation, Elastic, Tilt};
use crate::mesh::{MaterialSpec, MeshData};
use crate::point::{DomainPoint, Point, SolidFluidPoint};
use crate::spectral::SpectralContext;
use ndarray::{Array1, Array2};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Geometry of one global element
struct ElementGeometry {
    /// Corners after rotating the axis side to side 3
    shift: usize,
    axial: bool,
    map: QuadMap,
    factors: GeometricFactors,
}

fn element_geometry(mesh: &MeshData, ctx: &SpectralContext, e: usize) -> Result<ElementGeometry> {
    let spec = &mesh.elements[e];
    let (corners, axial, shift) = match mesh.axis_side(e) {
        Some(side) => (QuadMap::rotated_to_side3(spec.corners, side), true, (side + 1) % 4),
        None => (spec.corners, false, 0),
    };
    let map = QuadMap::new(corners.map(|c| mesh.nodes[c]));
    let factors = GeometricFactors::new(&map, ctx.xi_basis(axial), &ctx.gll, axial)
        .map_err(|msg| SolverError::MalformedMesh(format!("element {}: {}", e, msg)))?;
    Ok(ElementGeometry {
        shift,
        axial,
        map,
        factors,
    })
}

/// Largest velocity an element's material reaches at any azimuth
fn max_velocity(mesh: &MeshData, e: usize) -> f64 {
    let boost = mesh.elements[e]
        .perturbation
        .map(|p| 1.0 + p.amplitude.abs())
        .unwrap_or(1.0);
    mesh.material(e).max_vp() * boost
}

fn stable_dt(mesh: &MeshData, geometry: &[ElementGeometry]) -> f64 {
    geometry
        .iter()
        .enumerate()
        .map(|(e, g)| g.factors.min_spacing() / max_velocity(mesh, e))
        .fold(f64::INFINITY, f64::min)
}

/// Largest stable time step (Courant number 1) of the mesh
pub fn estimate_dt(mesh: &MeshData, ctx: &SpectralContext) -> Result<f64> {
    mesh.validate()?;
    let geometry = (0..mesh.num_elements())
        .map(|e| element_geometry(mesh, ctx, e))
        .collect::<Result<Vec<_>>>()?;
    Ok(stable_dt(mesh, &geometry))
}

/// Accumulated data of one global point
#[derive(Debug, Clone, Default)]
struct GlobalPoint {
    coords: [f64; 2],
    axial: bool,
    solid_nr: usize,
    fluid_nr: usize,
    solid_mass: f64,
    fluid_mass: f64,
    ranks: BTreeSet<usize>,
    on_interface: bool,
    normal: [f64; 2],
}

/// Point numbering by location, tolerant to round-off
struct PointIndex {
    tol: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    coords: Vec<[f64; 2]>,
}

impl PointIndex {
    fn new(tol: f64) -> Self {
        Self {
            tol,
            cells: HashMap::new(),
            coords: Vec::new(),
        }
    }

    fn cell(&self, p: [f64; 2]) -> (i64, i64) {
        ((p[0] / self.tol).round() as i64, (p[1] / self.tol).round() as i64)
    }

    fn find_or_insert(&mut self, p: [f64; 2]) -> usize {
        let (cs, cz) = self.cell(p);
        for ds in -1..=1 {
            for dz in -1..=1 {
                if let Some(tags) = self.cells.get(&(cs + ds, cz + dz)) {
                    for &t in tags {
                        let q = self.coords[t];
                        if (q[0] - p[0]).hypot(q[1] - p[1]) <= self.tol {
                            return t;
                        }
                    }
                }
            }
        }
        let tag = self.coords.len();
        self.coords.push(p);
        self.cells.entry((cs, cz)).or_default().push(tag);
        tag
    }
}

/// Per-rank pieces, before the communicator joins them
struct LocalDomain {
    points: Vec<DomainPoint>,
    elements: Vec<Element>,
    messaging: MessagingInfo,
    sources: Vec<SourceTerm>,
    stations: Vec<Station>,
    suggested_dt: f64,
}

/// Builder of the domain of one rank
pub struct DomainBuilder<'a> {
    mesh: &'a MeshData,
    ctx: Arc<SpectralContext>,
    partition: Option<Vec<usize>>,
    policy: Box<dyn ModeTruncation>,
    dt: f64,
    relaxation_times: Vec<f64>,
    sources: Vec<SourceSpec>,
    stations: Vec<StationSpec>,
    sink: Option<Box<dyn StationSink>>,
    dump_interval: usize,
}

impl<'a> DomainBuilder<'a> {
    pub fn new(mesh: &'a MeshData, ctx: Arc<SpectralContext>) -> Self {
        Self {
            mesh,
            ctx,
            partition: None,
            policy: Box::new(MeshNr),
            dt: 0.0,
            relaxation_times: Vec::new(),
            sources: Vec::new(),
            stations: Vec::new(),
            sink: None,
            dump_interval: 1000,
        }
    }

    /// Rank of every element; all elements on rank 0 when unset
    pub fn partition(mut self, partition: Vec<usize>) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn policy<P: ModeTruncation + 'static>(mut self, policy: P) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Time step, needed by attenuation
    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    /// Relaxation times of the attenuation mechanisms
    pub fn relaxation_times(mut self, taus: Vec<f64>) -> Self {
        self.relaxation_times = taus;
        self
    }

    pub fn source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    pub fn station(mut self, station: StationSpec) -> Self {
        self.stations.push(station);
        self
    }

    pub fn sink(mut self, sink: Box<dyn StationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn dump_interval(mut self, records: usize) -> Self {
        self.dump_interval = records.max(1);
        self
    }

    /// Set up the domain of the rank owning `comm`
    ///
    /// Setup errors abort the group so that no peer waits on this rank.
    pub fn build(self, comm: Box<dyn Communicator>) -> Result<Domain> {
        let local = match self.build_local(comm.rank(), comm.size()) {
            Ok(local) => local,
            Err(err) => {
                log::error!("Rank {}: {}", comm.rank(), err);
                comm.abort(&err.to_string());
                return Err(err);
            }
        };
        Ok(Domain {
            ctx: self.ctx,
            comm,
            points: local.points,
            elements: local.elements,
            messaging: local.messaging,
            sources: local.sources,
            stations: local.stations,
            sink: self.sink,
            dump_interval: self.dump_interval,
            suggested_dt: local.suggested_dt,
            timers: PhaseTimers::default(),
        })
    }

    fn build_local(&self, rank: usize, size: usize) -> Result<LocalDomain> {
        let mesh = self.mesh;
        let ctx = &self.ctx;
        mesh.validate()?;
        let ne = mesh.num_elements();
        let npe = ctx.npe();

        let partition = self.partition.clone().unwrap_or_else(|| vec![0; ne]);
        if partition.len() != ne {
            return Err(SolverError::Config(format!(
                "partition lists {} elements, mesh has {}",
                partition.len(),
                ne
            )));
        }
        if let Some(&r) = partition.iter().find(|&&r| r >= size) {
            return Err(SolverError::Config(format!(
                "partition assigns rank {} in a group of {}",
                r, size
            )));
        }

        let geometry = (0..ne)
            .map(|e| element_geometry(mesh, ctx, e))
            .collect::<Result<Vec<_>>>()?;
        let nrs: Vec<usize> = (0..ne)
            .map(|e| self.policy.nr(e, mesh.elements[e].nr))
            .collect();
        if let Some(e) = nrs.iter().position(|&nr| nr == 0) {
            return Err(SolverError::Config(format!("element {} gets nr = 0", e)));
        }

        // global points
        let mut index = PointIndex::new(mesh.dist_tolerance);
        let mut global: Vec<GlobalPoint> = Vec::new();
        let mut tags: Vec<Vec<usize>> = Vec::with_capacity(ne);
        for (e, g) in geometry.iter().enumerate() {
            let material = mesh.material(e);
            let fluid = material.is_fluid();
            let mut element_tags = Vec::with_capacity(npe * npe);
            for i in 0..npe {
                for j in 0..npe {
                    let on_axis = g.axial && i == 0;
                    let mut p = g.factors.coords[[i, j]];
                    if on_axis {
                        p[0] = 0.0;
                    }
                    let tag = index.find_or_insert(p);
                    if tag == global.len() {
                        global.push(GlobalPoint {
                            coords: p,
                            ..Default::default()
                        });
                    }
                    let gp = &mut global[tag];
                    gp.axial |= on_axis;
                    gp.ranks.insert(partition[e]);
                    let w = g.factors.integral[[i, j]];
                    if fluid {
                        gp.fluid_nr = gp.fluid_nr.max(nrs[e]);
                        gp.fluid_mass += w / material.kappa().unwrap_or(1.0);
                    } else {
                        gp.solid_nr = gp.solid_nr.max(nrs[e]);
                        gp.solid_mass += w * material.density();
                    }
                    element_tags.push(tag);
                }
            }
            tags.push(element_tags);
        }

        self.interface_normals(&geometry, &tags, &mut global);
        for (tag, gp) in global.iter().enumerate() {
            let both = gp.solid_nr > 0 && gp.fluid_nr > 0;
            if both && !gp.on_interface {
                return Err(SolverError::MalformedMesh(format!(
                    "point {} at ({:.6e}, {:.6e}) joins solid and fluid outside the solid_fluid side set",
                    tag, gp.coords[0], gp.coords[1]
                )));
            }
            if gp.on_interface && !both {
                return Err(SolverError::MalformedMesh(format!(
                    "solid_fluid edge point {} at ({:.6e}, {:.6e}) has no fluid neighbour",
                    tag, gp.coords[0], gp.coords[1]
                )));
            }
        }

        // local points, ordered by global tag
        let local_elements: Vec<usize> = (0..ne).filter(|&e| partition[e] == rank).collect();
        let local_tags: BTreeSet<usize> = local_elements
            .iter()
            .flat_map(|&e| tags[e].iter().copied())
            .collect();
        let mut local_of: HashMap<usize, usize> = HashMap::with_capacity(local_tags.len());
        let mut points = Vec::with_capacity(local_tags.len());
        for (local, &tag) in local_tags.iter().enumerate() {
            local_of.insert(tag, local);
            let mut point = make_point(tag, &global[tag])?;
            point.set_owned(global[tag].ranks.first() == Some(&rank));
            points.push(point);
        }

        // neighbours
        let links = (0..size)
            .filter(|&q| q != rank)
            .map(|q| NeighbourLink {
                rank: q,
                points: local_tags
                    .iter()
                    .filter(|&&t| global[t].ranks.contains(&q))
                    .map(|t| local_of[t])
                    .collect(),
            })
            .collect();
        let messaging = MessagingInfo::new(links);

        // elements
        if !self.relaxation_times.is_empty() && self.dt <= 0.0 {
            return Err(SolverError::Config("attenuation requires a positive dt".into()));
        }
        let mut elements = Vec::with_capacity(local_elements.len());
        let mut local_element_of = HashMap::with_capacity(local_elements.len());
        for &e in &local_elements {
            let g = &geometry[e];
            let physics = self.physics(e, nrs[e], &g.factors)?;
            let element_points = tags[e].iter().map(|t| local_of[t]).collect();
            local_element_of.insert(e, elements.len());
            elements.push(Element::new(
                e,
                element_points,
                Gradient::new(g.factors.clone(), g.axial),
                physics,
                nrs[e],
                ctx,
            )?);
        }

        // sources on the owning rank only
        let mut sources = Vec::new();
        for spec in &self.sources {
            let tag = global
                .iter()
                .enumerate()
                .filter(|(_, gp)| gp.axial && gp.solid_nr > 0)
                .min_by(|a, b| {
                    (a.1.coords[1] - spec.z)
                        .abs()
                        .total_cmp(&(b.1.coords[1] - spec.z).abs())
                })
                .map(|(t, _)| t)
                .ok_or_else(|| SolverError::Config("no solid axis point for the source".into()))?;
            if let Some(&local) = local_of.get(&tag) {
                if points[local].owned() {
                    let nu = global[tag].solid_nr / 2;
                    let pattern = SourceTerm::axial_force_pattern(spec.force, nu);
                    log::info!(
                        "Rank {}: source at z = {:.6e} on point {}",
                        rank,
                        global[tag].coords[1],
                        tag
                    );
                    sources.push(SourceTerm::new(local, pattern, spec.stf.clone()));
                }
            }
        }

        // stations in the lowest-index element containing them
        let mut stations = Vec::new();
        for spec in &self.stations {
            let found = geometry
                .iter()
                .enumerate()
                .find_map(|(e, g)| g.map.inverse_map(spec.s, spec.z).map(|xe| (e, xe)));
            let Some((e, (xi, eta))) = found else {
                return Err(SolverError::Config(format!(
                    "station {} at ({}, {}) is outside the mesh",
                    spec.name, spec.s, spec.z
                )));
            };
            if let Some(&local) = local_element_of.get(&e) {
                let lx = ctx.xi_basis(geometry[e].axial).lagrange(xi);
                let le = ctx.gll.lagrange(eta);
                let weights = Array2::from_shape_fn((npe, npe), |(i, j)| lx[i] * le[j]);
                stations.push(Station::new(spec.clone(), local, weights));
            }
        }

        log::info!(
            "Rank {}/{}: {} elements, {} points, {} neighbours",
            rank,
            size,
            elements.len(),
            points.len(),
            messaging.links.len()
        );

        Ok(LocalDomain {
            points,
            elements,
            messaging,
            sources,
            stations,
            suggested_dt: stable_dt(mesh, &geometry),
        })
    }

    /// Weighted interface normals, summed over every interface edge
    fn interface_normals(&self, geometry: &[ElementGeometry], tags: &[Vec<usize>], global: &mut [GlobalPoint]) {
        let ctx = &self.ctx;
        let npe = ctx.npe();
        let last = npe - 1;
        for &(e, side) in &self.mesh.solid_fluid {
            let g = &geometry[e];
            let side = (side + 4 - g.shift) % 4;
            let xi_basis = ctx.xi_basis(g.axial);
            for k in 0..npe {
                let (i, j) = match side {
                    0 => (k, 0),
                    1 => (last, k),
                    2 => (k, last),
                    _ => (0, k),
                };
                let (xi, eta) = (xi_basis.points[i], ctx.gll.points[j]);
                let jac = g.map.jacobian(xi, eta).matrix;
                let d_xi = [jac[0][0], jac[1][0]];
                let d_eta = [jac[0][1], jac[1][1]];
                let (tangent, weight) = match side {
                    0 => (d_xi, xi_basis.weights[i]),
                    1 => (d_eta, ctx.gll.weights[j]),
                    2 => ([-d_xi[0], -d_xi[1]], xi_basis.weights[i]),
                    _ => ([-d_eta[0], -d_eta[1]], ctx.gll.weights[j]),
                };
                let s = g.map.map(xi, eta)[0];
                let s_factor = if g.axial && (side == 0 || side == 2) {
                    if i == 0 { d_xi[0] } else { s / (1.0 + xi) }
                } else {
                    s
                };
                let gp = &mut global[tags[e][i * npe + j]];
                gp.on_interface = true;
                gp.normal[0] += weight * s_factor * tangent[1];
                gp.normal[1] -= weight * s_factor * tangent[0];
            }
        }
    }

    fn physics(&self, e: usize, nr: usize, factors: &GeometricFactors) -> Result<ElementPhysics> {
        let spec = &self.mesh.elements[e];
        let integral: Array1<f64> = factors.integral.iter().copied().collect();
        let nodes = integral.len();
        let velocity: Vec<f64> = match spec.perturbation {
            // moduli go as v², so they carry cos(2·order·φ)
            Some(p) if 4 * p.order > nr => {
                return Err(SolverError::UnsupportedMaterial {
                    element: e,
                    reason: format!(
                        "azimuthal perturbation of order {} needs nr >= {}, element has nr = {}",
                        p.order,
                        4 * p.order,
                        nr
                    ),
                });
            }
            Some(p) => p.samples(nr),
            None => vec![1.0],
        };
        let ns = velocity.len();
        let field = |f: &dyn Fn(f64) -> f64| Array2::from_shape_fn((ns, nodes), |(k, _)| f(velocity[k]));

        let physics = match *self.mesh.material(e) {
            MaterialSpec::Isotropic { rho, vp, vs, q_mu } => {
                let mu = field(&|v| rho * (vs * v).powi(2));
                let lambda = field(&|v| rho * (vp * v).powi(2)) - &mu * 2.0;
                let elastic = Elastic::Isotropic { lambda, mu }.scaled(integral.view());
                let attenuation = match q_mu {
                    Some(q) if !self.relaxation_times.is_empty() => Some(Attenuation::standard_linear_solid(
                        self.dt,
                        &self.relaxation_times,
                        q,
                        &elastic.shear_modulus(),
                    )),
                    Some(_) => {
                        log::warn!("Element {}: q_mu given without relaxation times, attenuation off", e);
                        None
                    }
                    None => None,
                };
                ElementPhysics::Solid {
                    elastic,
                    attenuation,
                }
            }
            MaterialSpec::TransverselyIsotropic {
                rho,
                vpv,
                vph,
                vsv,
                vsh,
                eta,
                tilt,
            } => {
                let a = field(&|v| rho * (vph * v).powi(2));
                let c = field(&|v| rho * (vpv * v).powi(2));
                let l = field(&|v| rho * (vsv * v).powi(2));
                let n = field(&|v| rho * (vsh * v).powi(2));
                let f = (&a - &(&l * 2.0)) * eta;
                let tilt = (tilt != 0.0).then(|| Tilt::from_angles(&Array2::from_elem((ns, nodes), tilt)));
                ElementPhysics::Solid {
                    elastic: Elastic::TransverselyIsotropic { a, c, f, l, n, tilt }.scaled(integral.view()),
                    attenuation: None,
                }
            }
            MaterialSpec::Fluid { rho, .. } => {
                if spec.perturbation.is_some() {
                    return Err(SolverError::UnsupportedMaterial {
                        element: e,
                        reason: "azimuthal perturbation of a fluid".into(),
                    });
                }
                ElementPhysics::Fluid {
                    acoustic: Acoustic::new(Array2::from_elem((1, nodes), 1.0 / rho)).scaled(integral.view()),
                }
            }
        };
        Ok(physics)
    }
}

fn make_point(tag: usize, gp: &GlobalPoint) -> Result<DomainPoint> {
    let solid = (gp.solid_nr > 0).then(|| {
        let mut p = Point::new(tag, gp.coords, gp.solid_nr, 3, gp.axial);
        p.set_mass(gp.solid_mass);
        p
    });
    let fluid = (gp.fluid_nr > 0).then(|| {
        let mut p = Point::new(tag, gp.coords, gp.fluid_nr, 1, gp.axial);
        p.set_mass(gp.fluid_mass);
        p
    });
    match (solid, fluid) {
        (Some(s), Some(f)) => Ok(DomainPoint::SolidFluid(SolidFluidPoint::new(s, f, gp.normal)?)),
        (Some(s), None) => Ok(DomainPoint::Solid(s)),
        (None, Some(f)) => Ok(DomainPoint::Fluid(f)),
        (None, None) => Err(SolverError::MalformedMesh(format!("point {} belongs to no element", tag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::mesh::{rectangular_meridian, solid_fluid_column};
    use approx::assert_relative_eq;

    fn rock() -> MaterialSpec {
        MaterialSpec::Isotropic {
            rho: 2.0,
            vp: 3.0,
            vs: 1.5,
            q_mu: None,
        }
    }

    fn water() -> MaterialSpec {
        MaterialSpec::Fluid { rho: 1.0, vp: 1.5 }
    }

    #[test]
    fn test_shared_points_are_merged() {
        let ctx = Arc::new(SpectralContext::init(4, 4).unwrap());
        let mesh = rectangular_meridian(2.0, 0.0, 1.0, 2, 1, rock(), 4);
        let domain = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm)).unwrap();
        // two 5x5 elements sharing one edge of 5 nodes
        assert_eq!(domain.points().len(), 45);
        assert_eq!(domain.elements().len(), 2);
        assert!(domain.points().iter().all(|p| p.owned()));
    }

    #[test]
    fn test_mass_is_density_times_volume() {
        let ctx = Arc::new(SpectralContext::init(3, 2).unwrap());
        let mesh = rectangular_meridian(2.0, 0.0, 1.0, 2, 2, rock(), 1);
        let domain = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm)).unwrap();
        let mass: f64 = domain
            .points()
            .iter()
            .filter_map(|p| p.solid())
            .map(|p| 1.0 / p.inv_mass)
            .sum();
        // ρ ∫∫ s ds dz over [0, 2] x [0, 1]
        assert_relative_eq!(mass, 2.0 * 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_interface_normals() {
        let ctx = Arc::new(SpectralContext::init(3, 2).unwrap());
        let mesh = solid_fluid_column(2.0, 0.0, 1.0, 2.0, 2, 1, 1, rock(), water(), 2);
        let domain = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm)).unwrap();
        let sf: Vec<_> = domain
            .points()
            .iter()
            .filter_map(|p| match p {
                DomainPoint::SolidFluid(sf) => Some(sf),
                _ => None,
            })
            .collect();
        assert_eq!(sf.len(), 7);
        // upward normal, total ∫ s ds over [0, 2] = 2
        let total_nz: f64 = sf.iter().map(|p| p.normal()[1]).sum();
        assert_relative_eq!(total_nz, 2.0, epsilon = 1e-10);
        assert!(sf.iter().all(|p| p.normal()[0].abs() < 1e-12));
    }

    #[test]
    fn test_partitioned_ownership() {
        let ctx = Arc::new(SpectralContext::init(2, 2).unwrap());
        let mesh = rectangular_meridian(1.0, 0.0, 2.0, 1, 2, rock(), 2);
        let comms = crate::comm::ThreadGroup::create(2);
        let mut owned = 0;
        let mut shared = 0;
        for comm in comms {
            let domain = DomainBuilder::new(&mesh, Arc::clone(&ctx))
                .partition(vec![0, 1])
                .build(Box::new(comm))
                .unwrap();
            owned += domain.points().iter().filter(|p| p.owned()).count();
            shared += domain.messaging().links.iter().map(|l| l.points.len()).sum::<usize>();
        }
        // 15 distinct points, 3 on the shared edge seen from both sides
        assert_eq!(owned, 15);
        assert_eq!(shared, 6);
    }

    #[test]
    fn test_incompatible_interface_rejected() {
        let ctx = Arc::new(SpectralContext::init(2, 8).unwrap());
        let mut mesh = solid_fluid_column(1.0, 0.0, 1.0, 2.0, 1, 1, 1, rock(), water(), 4);
        mesh.elements[1].nr = 6;
        let err = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm)).unwrap_err();
        assert!(matches!(err, SolverError::IncompatibleCoupling { .. }));
    }

    #[test]
    fn test_perturbation_order_limited_by_modes() {
        let ctx = Arc::new(SpectralContext::init(2, 8).unwrap());
        let mut mesh = rectangular_meridian(1.0, 0.0, 1.0, 1, 1, rock(), 4);
        mesh.elements[0].perturbation = Some(crate::mesh::AzimuthalPerturbation {
            amplitude: 0.2,
            order: 3,
        });
        let err = DomainBuilder::new(&mesh, Arc::clone(&ctx))
            .build(Box::new(SerialComm))
            .unwrap_err();
        assert!(matches!(err, SolverError::UnsupportedMaterial { element: 0, .. }));

        // order 1 needs four samples
        mesh.elements[0].nr = 3;
        mesh.elements[0].perturbation = Some(crate::mesh::AzimuthalPerturbation {
            amplitude: 0.2,
            order: 1,
        });
        assert!(DomainBuilder::new(&mesh, Arc::clone(&ctx)).build(Box::new(SerialComm)).is_err());

        mesh.elements[0].nr = 4;
        let domain = DomainBuilder::new(&mesh, ctx).build(Box::new(SerialComm)).unwrap();
        assert_eq!(domain.elements()[0].nr(), 4);
    }

    #[test]
    fn test_uniform_policy_overrides_mesh() {
        let ctx = Arc::new(SpectralContext::init(2, 8).unwrap());
        let mesh = rectangular_meridian(1.0, 0.0, 1.0, 1, 1, rock(), 3);
        let domain = DomainBuilder::new(&mesh, ctx)
            .policy(super::super::policy::UniformNr(8))
            .build(Box::new(SerialComm))
            .unwrap();
        assert_eq!(domain.elements()[0].nr(), 8);
    }

    #[test]
    fn test_estimate_dt_scales_with_velocity() {
        let ctx = SpectralContext::init(4, 2).unwrap();
        let slow = rectangular_meridian(1.0, 0.0, 1.0, 2, 2, rock(), 1);
        let fast = rectangular_meridian(
            1.0,
            0.0,
            1.0,
            2,
            2,
            MaterialSpec::Isotropic {
                rho: 2.0,
                vp: 6.0,
                vs: 3.0,
                q_mu: None,
            },
            1,
        );
        let a = estimate_dt(&slow, &ctx).unwrap();
        let b = estimate_dt(&fast, &ctx).unwrap();
        assert_relative_eq!(a, 2.0 * b, epsilon = 1e-12);
    }

    #[test]
    fn test_station_outside_mesh_rejected() {
        let ctx = Arc::new(SpectralContext::init(2, 2).unwrap());
        let mesh = rectangular_meridian(1.0, 0.0, 1.0, 1, 1, rock(), 1);
        let err = DomainBuilder::new(&mesh, ctx)
            .station(StationSpec {
                name: "far".into(),
                s: 5.0,
                z: 0.5,
                phi: 0.0,
            })
            .build(Box::new(SerialComm))
            .unwrap_err();
        assert!(matches!(err, SolverError::Config(_)));
    }
}
