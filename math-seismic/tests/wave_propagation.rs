//! End-to-end scenarios of the time loop

use approx::assert_relative_eq;
use math_seismic::comm::{SerialComm, ThreadGroup};
use math_seismic::domain::{Domain, DomainBuilder, MemorySink, SourceSpec, StationSpec};
use math_seismic::mesh::{MaterialSpec, MeshData, partition_stripes, rectangular_meridian, solid_fluid_column};
use math_seismic::point::DomainPoint;
use math_seismic::stf::SourceTimeFunction;
use math_seismic::{Newmark, SolverConfig, SolverError, SpectralContext, estimate_dt};
use std::sync::Arc;
use std::thread;

fn rock() -> MaterialSpec {
    MaterialSpec::Isotropic {
        rho: 2.0,
        vp: 3.0,
        vs: 1.7,
        q_mu: None,
    }
}

fn water() -> MaterialSpec {
    MaterialSpec::Fluid { rho: 1.0, vp: 1.5 }
}

fn serial(mesh: &MeshData, ctx: &Arc<SpectralContext>) -> Domain {
    DomainBuilder::new(mesh, Arc::clone(ctx))
        .build(Box::new(SerialComm))
        .unwrap()
}

/// Run `steps` steps on every rank of a threaded group, returning per-rank
/// `(tag, displacement)` of the owned points
fn run_partitioned(
    mesh: &MeshData,
    ctx: &Arc<SpectralContext>,
    nranks: usize,
    dt: f64,
    steps: usize,
) -> Vec<(usize, Vec<f64>)> {
    let partition = partition_stripes(mesh, nranks);
    let per_rank: Vec<Vec<(usize, Vec<f64>)>> = thread::scope(|scope| {
        let handles: Vec<_> = ThreadGroup::create(nranks)
            .into_iter()
            .map(|comm| {
                let partition = partition.clone();
                let ctx = Arc::clone(ctx);
                scope.spawn(move || {
                    let mut domain = DomainBuilder::new(mesh, ctx)
                        .partition(partition)
                        .build(Box::new(comm))
                        .unwrap();
                    domain.init_displ_tiny_random(1e-3, 11);
                    let newmark = Newmark::new(dt, steps);
                    for n in 0..steps {
                        newmark.step(&mut domain, n).unwrap();
                    }
                    domain
                        .points()
                        .iter()
                        .filter(|p| p.owned())
                        .map(|p| (p.tag(), flatten(p)))
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let mut all: Vec<(usize, Vec<f64>)> = per_rank.into_iter().flatten().collect();
    all.sort_by_key(|(tag, _)| *tag);
    all
}

fn flatten(p: &DomainPoint) -> Vec<f64> {
    [p.solid(), p.fluid()]
        .into_iter()
        .flatten()
        .flat_map(|part| part.displ.iter().flat_map(|c| [c.re, c.im]).collect::<Vec<_>>())
        .collect()
}

#[test]
fn test_impulse_on_single_axial_element() {
    let ctx = Arc::new(SpectralContext::init(4, 1).unwrap());
    let mesh = rectangular_meridian(1.0, 0.0, 1.0, 1, 1, rock(), 1);
    let dt = 0.3 * estimate_dt(&mesh, &ctx).unwrap();
    let sink = MemorySink::new();
    let mut builder = DomainBuilder::new(&mesh, Arc::clone(&ctx))
        .source(SourceSpec {
            z: 0.5,
            force: [0.0, 0.0, 1.0],
            stf: SourceTimeFunction::impulse(5, dt, 20),
        })
        .sink(Box::new(sink.clone()));
    for (name, phi) in [("east", 0.0), ("west", std::f64::consts::PI)] {
        builder = builder.station(StationSpec {
            name: name.into(),
            s: 0.4,
            z: 0.6,
            phi,
        });
    }
    let mut domain = builder.build(Box::new(SerialComm)).unwrap();
    assert_eq!(domain.sources().len(), 1);

    let newmark = Newmark::new(dt, 12);
    for n in 0..12 {
        newmark.step(&mut domain, n).unwrap();
        let max = domain.points().iter().map(|p| p.max_displ()).fold(0.0, f64::max);
        if n < 5 {
            assert_eq!(max, 0.0, "displacement before the impulse at step {}", n);
        } else {
            assert!(max > 0.0, "no displacement after the impulse at step {}", n);
        }
    }
    domain.dump_left().unwrap();

    // vertical force on the axis: no torsion, no radial motion on the axis
    for p in domain.points() {
        let solid = p.solid().unwrap();
        assert!(solid.displ[[0, 1]].norm() < 1e-14);
        if solid.axial {
            assert!(solid.displ[[0, 0]].norm() < 1e-14);
        }
    }

    // axisymmetric response: the same field on both sides of the axis
    let east = sink.station("east");
    let west = sink.station("west");
    assert_eq!(east.len(), 12);
    for (e, w) in east.iter().zip(&west) {
        for k in 0..3 {
            assert_relative_eq!(e.values[k], w.values[k], epsilon = 1e-14);
        }
    }
    assert!(east.last().unwrap().values[2].abs() > 0.0);
}

#[test]
fn test_shared_point_force_is_sum_of_elements() {
    let ctx = Arc::new(SpectralContext::init(3, 4).unwrap());
    let mesh = rectangular_meridian(2.0, 0.0, 1.0, 2, 1, rock(), 4);
    let mut domain = serial(&mesh, &ctx);
    domain.init_displ_tiny_random(1e-2, 5);
    let points = domain.points().to_vec();

    let shared: Vec<usize> = {
        let a: Vec<usize> = domain.elements()[0].points().to_vec();
        domain.elements()[1]
            .points()
            .iter()
            .copied()
            .filter(|p| a.contains(p))
            .collect()
    };
    assert_eq!(shared.len(), ctx.npe());

    let mut separate = Vec::new();
    for element in domain.elements() {
        let mut element = element.clone();
        let mut pts = points.clone();
        let force = element.compute_forces(&pts, &ctx, false).unwrap();
        element.scatter(&force, &mut pts).unwrap();
        separate.push(pts);
    }

    domain.compute_stiff().unwrap();
    for &p in &shared {
        let total = &domain.points()[p].solid().unwrap().stiff;
        let a = &separate[0][p].solid().unwrap().stiff;
        let b = &separate[1][p].solid().unwrap().stiff;
        for ((t, x), y) in total.iter().zip(a.iter()).zip(b.iter()) {
            assert_eq!(*t, *x + *y);
        }
    }
}

#[test]
fn test_partition_invariance() {
    let ctx = Arc::new(SpectralContext::init(3, 5).unwrap());
    let mesh = rectangular_meridian(2.0, 0.0, 3.0, 2, 3, rock(), 5);
    let dt = 0.1 * estimate_dt(&mesh, &ctx).unwrap();
    let single = run_partitioned(&mesh, &ctx, 1, dt, 15);
    let split = run_partitioned(&mesh, &ctx, 3, dt, 15);
    assert_eq!(single.len(), split.len());
    for ((ta, a), (tb, b)) in single.iter().zip(&split) {
        assert_eq!(ta, tb);
        for (x, y) in a.iter().zip(b) {
            assert_relative_eq!(*x, *y, epsilon = 1e-14, max_relative = 1e-10);
        }
    }
}

#[test]
fn test_solid_fluid_partition_invariance() {
    let ctx = Arc::new(SpectralContext::init(3, 1).unwrap());
    let mesh = solid_fluid_column(2.0, 0.0, 1.0, 2.0, 2, 2, 2, rock(), water(), 1);
    let dt = 0.3 * estimate_dt(&mesh, &ctx).unwrap();
    let single = run_partitioned(&mesh, &ctx, 1, dt, 10);
    let split = run_partitioned(&mesh, &ctx, 2, dt, 10);
    for ((ta, a), (tb, b)) in single.iter().zip(&split) {
        assert_eq!(ta, tb);
        for (x, y) in a.iter().zip(b) {
            assert_relative_eq!(*x, *y, epsilon = 1e-14, max_relative = 1e-10);
        }
    }
}

#[test]
fn test_energy_is_conserved() {
    let ctx = Arc::new(SpectralContext::init(4, 5).unwrap());
    let mesh = rectangular_meridian(1.0, 0.0, 1.0, 2, 2, rock(), 5);
    // higher modes stiffen the column next to the axis
    let dt = 0.1 * estimate_dt(&mesh, &ctx).unwrap();
    let mut domain = serial(&mesh, &ctx);
    domain.init_displ_tiny_random(1e-3, 3);

    let newmark = Newmark::new(dt, 200);
    newmark.step(&mut domain, 0).unwrap();
    let e0 = domain.total_energy(dt).unwrap();
    assert!(e0 > 0.0);
    for n in 1..200 {
        newmark.step(&mut domain, n).unwrap();
    }
    let e1 = domain.total_energy(dt).unwrap();
    assert_relative_eq!(e0, e1, max_relative = 1e-8);
}

#[test]
fn test_solid_fluid_energy_is_conserved() {
    for nr in [1, 3] {
        let ctx = Arc::new(SpectralContext::init(3, nr).unwrap());
        let mesh = solid_fluid_column(2.0, 0.0, 1.0, 2.0, 2, 2, 2, rock(), water(), nr);
        let dt = 0.1 * estimate_dt(&mesh, &ctx).unwrap();
        let mut domain = serial(&mesh, &ctx);
        domain.init_displ_tiny_random(1e-3, 3);

        let newmark = Newmark::new(dt, 400);
        newmark.step(&mut domain, 0).unwrap();
        let e0 = domain.total_energy(dt).unwrap();
        assert!(e0 > 0.0);
        for n in 1..400 {
            newmark.step(&mut domain, n).unwrap();
        }
        let e1 = domain.total_energy(dt).unwrap();
        assert_relative_eq!(e0, e1, max_relative = 1e-8);
    }
}

#[test]
fn test_solid_fluid_energy_is_partition_independent() {
    let ctx = Arc::new(SpectralContext::init(3, 2).unwrap());
    let mesh = solid_fluid_column(2.0, 0.0, 1.0, 2.0, 2, 2, 2, rock(), water(), 2);
    let dt = 0.1 * estimate_dt(&mesh, &ctx).unwrap();
    let partition = partition_stripes(&mesh, 2);
    let energies: Vec<f64> = thread::scope(|scope| {
        let handles: Vec<_> = ThreadGroup::create(2)
            .into_iter()
            .map(|comm| {
                let (partition, ctx, mesh) = (partition.clone(), Arc::clone(&ctx), &mesh);
                scope.spawn(move || {
                    let mut domain = DomainBuilder::new(mesh, ctx)
                        .partition(partition)
                        .build(Box::new(comm))
                        .unwrap();
                    domain.init_displ_tiny_random(1e-3, 4);
                    let newmark = Newmark::new(dt, 20);
                    for n in 0..20 {
                        newmark.step(&mut domain, n).unwrap();
                    }
                    domain.total_energy(dt).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut domain = serial(&mesh, &ctx);
    domain.init_displ_tiny_random(1e-3, 4);
    let newmark = Newmark::new(dt, 20);
    for n in 0..20 {
        newmark.step(&mut domain, n).unwrap();
    }
    let single = domain.total_energy(dt).unwrap();
    for e in energies {
        assert_relative_eq!(e, single, max_relative = 1e-10);
    }
}

#[test]
fn test_solid_fluid_run_stays_bounded() {
    let ctx = Arc::new(SpectralContext::init(3, 1).unwrap());
    let mesh = solid_fluid_column(2.0, 0.0, 1.0, 2.0, 2, 2, 2, rock(), water(), 1);
    let dt = 0.1 * estimate_dt(&mesh, &ctx).unwrap();
    let mut domain = serial(&mesh, &ctx);
    domain.init_displ_tiny_random(1e-3, 11);

    let mut newmark = Newmark::new(dt, 2500);
    newmark.stability_interval = 50;
    newmark.stability_threshold = 1.0;
    newmark.solve(&mut domain).unwrap();
    let max = domain.points().iter().map(|p| p.max_displ()).fold(0.0, f64::max);
    assert!(max < 1.0, "solid-fluid column grew to {:e}", max);
}

#[test]
fn test_divergence_is_reported() {
    let ctx = Arc::new(SpectralContext::init(3, 1).unwrap());
    let mesh = rectangular_meridian(1.0, 0.0, 1.0, 2, 2, rock(), 1);
    let dt = 20.0 * estimate_dt(&mesh, &ctx).unwrap();
    let mut domain = serial(&mesh, &ctx);
    domain.init_displ_tiny_random(1e-6, 1);
    let mut newmark = Newmark::new(dt, 500);
    newmark.stability_threshold = 1.0;
    match newmark.solve(&mut domain) {
        Err(SolverError::Diverged { step, location, .. }) => {
            assert!(step < 500);
            assert!(location.is_some());
        }
        other => panic!("expected divergence, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_divergence_stops_every_rank() {
    let ctx = Arc::new(SpectralContext::init(2, 1).unwrap());
    let mesh = rectangular_meridian(1.0, 0.0, 2.0, 1, 4, rock(), 1);
    let partition = partition_stripes(&mesh, 2);
    let steps: Vec<Option<usize>> = thread::scope(|scope| {
        let handles: Vec<_> = ThreadGroup::create(2)
            .into_iter()
            .map(|comm| {
                let (partition, ctx, mesh) = (partition.clone(), Arc::clone(&ctx), &mesh);
                scope.spawn(move || {
                    let mut domain = DomainBuilder::new(mesh, ctx)
                        .partition(partition)
                        .build(Box::new(comm))
                        .unwrap();
                    if domain.rank() == 1 {
                        domain.points_mut()[0].solid_mut().unwrap().displ[[0, 2]].re = f64::NAN;
                    }
                    let newmark = Newmark::new(1e-3, 10);
                    match newmark.solve(&mut domain) {
                        Err(SolverError::Diverged { step, .. }) => Some(step),
                        _ => None,
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(steps, vec![Some(0), Some(0)]);
}

#[test]
fn test_run_from_json() {
    let config = SolverConfig::from_json_str(
        r#"{
            "npol": 3,
            "max_nr": 4,
            "courant": 0.3,
            "total_steps": 30,
            "record_interval": 2,
            "dump_interval": 4,
            "source": {"kind": "ricker", "half_duration": 0.05, "z": 0.5, "force": [1.0, 0.0, 1.0]},
            "stations": [{"name": "S1", "s": 0.7, "z": 0.9, "phi": 0.3}]
        }"#,
    )
    .unwrap();
    let mesh = rectangular_meridian(1.0, 0.0, 1.0, 2, 2, rock(), 4);
    let mesh = MeshData::from_json_str(&mesh.to_json().unwrap()).unwrap();

    let ctx = Arc::new(SpectralContext::init(config.npol, config.max_nr).unwrap());
    let dt = config.courant * estimate_dt(&mesh, &ctx).unwrap();
    let sink = MemorySink::new();
    let source = config.source.as_ref().unwrap().to_source(dt, config.total_steps);
    let mut domain = DomainBuilder::new(&mesh, ctx)
        .source(source)
        .station(config.stations[0].clone())
        .sink(Box::new(sink.clone()))
        .dump_interval(config.dump_interval)
        .build(Box::new(SerialComm))
        .unwrap();
    config.newmark(dt).solve(&mut domain).unwrap();

    let records = sink.station("S1");
    assert_eq!(records.len(), 15);
    assert!(records.windows(2).all(|w| w[0].step + 2 == w[1].step));
    assert!(records.iter().any(|r| r.values.iter().any(|v| *v != 0.0)));
}
