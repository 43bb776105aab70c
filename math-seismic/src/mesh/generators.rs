//! Structured meshes of the meridian half-plane
//!
//! Rectangular blocks with the first element column on the axis, used by the
//! tests, benchmarks and the default driver setup.

use super::types::{ElementSpec, MaterialSpec, MeshData};

/// Node grid of `(ns + 1) x (nz + 1)` nodes, row by row in z
fn grid_nodes(s_max: f64, z: &[f64], ns: usize) -> Vec<[f64; 2]> {
    let ds = s_max / ns as f64;
    let mut nodes = Vec::with_capacity((ns + 1) * z.len());
    for &zj in z {
        for i in 0..=ns {
            nodes.push([i as f64 * ds, zj]);
        }
    }
    nodes
}

/// Quads of the grid cells between node rows `j0..j1`
fn grid_cells(ns: usize, rows: std::ops::Range<usize>, material: usize, nr: usize) -> Vec<ElementSpec> {
    let mut elements = Vec::new();
    for j in rows {
        for i in 0..ns {
            let n00 = j * (ns + 1) + i;
            let n10 = n00 + 1;
            let n01 = n00 + ns + 1;
            let n11 = n01 + 1;
            elements.push(ElementSpec {
                corners: [n00, n10, n11, n01],
                material,
                nr,
                perturbation: None,
            });
        }
    }
    elements
}

fn z_levels(z_min: f64, z_max: f64, n: usize) -> Vec<f64> {
    let dz = (z_max - z_min) / n as f64;
    (0..=n).map(|j| z_min + j as f64 * dz).collect()
}

/// Rectangle `[0, s_max] x [z_min, z_max]` of one material
///
/// Elements of the first column carry side 3 (s = 0) in the axis set; the
/// top row carries side 2 in the surface set.
pub fn rectangular_meridian(
    s_max: f64,
    z_min: f64,
    z_max: f64,
    ns: usize,
    nz: usize,
    material: MaterialSpec,
    nr: usize,
) -> MeshData {
    let z = z_levels(z_min, z_max, nz);
    let elements = grid_cells(ns, 0..nz, 0, nr);
    let axis = (0..nz).map(|j| (j * ns, 3)).collect();
    let surface = (0..ns).map(|i| ((nz - 1) * ns + i, 2)).collect();
    MeshData {
        nodes: grid_nodes(s_max, &z, ns),
        elements,
        materials: vec![material],
        axis,
        surface,
        solid_fluid: Vec::new(),
        dist_tolerance: 1e-9 * s_max.max(z_max - z_min),
    }
}

/// Solid block `[z_min, z_interface]` below a fluid block `[z_interface, z_max]`
///
/// The interface edges are the top sides of the uppermost solid row.
#[allow(clippy::too_many_arguments)]
pub fn solid_fluid_column(
    s_max: f64,
    z_min: f64,
    z_interface: f64,
    z_max: f64,
    ns: usize,
    nz_solid: usize,
    nz_fluid: usize,
    solid: MaterialSpec,
    fluid: MaterialSpec,
    nr: usize,
) -> MeshData {
    let mut z = z_levels(z_min, z_interface, nz_solid);
    z.extend(z_levels(z_interface, z_max, nz_fluid).into_iter().skip(1));
    let nz = nz_solid + nz_fluid;

    let mut elements = grid_cells(ns, 0..nz_solid, 0, nr);
    elements.extend(grid_cells(ns, nz_solid..nz, 1, nr));

    let axis = (0..nz).map(|j| (j * ns, 3)).collect();
    let surface = (0..ns).map(|i| ((nz - 1) * ns + i, 2)).collect();
    let solid_fluid = (0..ns).map(|i| ((nz_solid - 1) * ns + i, 2)).collect();
    MeshData {
        nodes: grid_nodes(s_max, &z, ns),
        elements,
        materials: vec![solid, fluid],
        axis,
        surface,
        solid_fluid,
        dist_tolerance: 1e-9 * s_max.max(z_max - z_min),
    }
}

/// Split elements into `nranks` horizontal stripes of near-equal size
///
/// Elements are ordered by centroid z, then s; each rank gets a contiguous
/// run. Returns the rank of every element.
pub fn partition_stripes(mesh: &MeshData, nranks: usize) -> Vec<usize> {
    let n = mesh.num_elements();
    let nranks = nranks.clamp(1, n.max(1));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let (ca, cb) = (mesh.centroid(a), mesh.centroid(b));
        ca[1].total_cmp(&cb[1]).then(ca[0].total_cmp(&cb[0]))
    });
    let mut rank = vec![0; n];
    for (k, &e) in order.iter().enumerate() {
        rank[e] = k * nranks / n;
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rock() -> MaterialSpec {
        MaterialSpec::Isotropic {
            rho: 1.0,
            vp: 2.0,
            vs: 1.0,
            q_mu: None,
        }
    }

    #[test]
    fn test_rectangular_meridian() {
        let mesh = rectangular_meridian(2.0, -1.0, 1.0, 4, 2, rock(), 6);
        assert_eq!(mesh.nodes.len(), 15);
        assert_eq!(mesh.num_elements(), 8);
        assert_eq!(mesh.axis, vec![(0, 3), (4, 3)]);
        assert_eq!(mesh.surface.len(), 4);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.corner_coords(5)[2], [1.0, 1.0]);
    }

    #[test]
    fn test_solid_fluid_column() {
        let fluid = MaterialSpec::Fluid { rho: 1.0, vp: 1.5 };
        let mesh = solid_fluid_column(1.0, 0.0, 1.0, 1.5, 2, 2, 1, rock(), fluid, 4);
        assert_eq!(mesh.num_elements(), 6);
        assert_eq!(mesh.solid_fluid, vec![(2, 2), (3, 2)]);
        assert!(mesh.material(4).is_fluid());
        assert!(!mesh.material(3).is_fluid());
        assert!(mesh.validate().is_ok());
        // interface nodes sit at z = 1
        for &(e, s) in &mesh.solid_fluid {
            for n in mesh.edge(e, s) {
                assert_eq!(mesh.nodes[n][1], 1.0);
            }
        }
    }

    #[test]
    fn test_partition_stripes() {
        let mesh = rectangular_meridian(1.0, 0.0, 1.0, 2, 4, rock(), 1);
        let part = partition_stripes(&mesh, 2);
        assert_eq!(part, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert!(partition_stripes(&mesh, 1).iter().all(|&r| r == 0));
        // more ranks than elements collapses to one element per rank
        let part = partition_stripes(&mesh, 20);
        assert_eq!(*part.iter().max().unwrap(), 7);
    }
}
