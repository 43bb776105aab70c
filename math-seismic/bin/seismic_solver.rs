//! Seismic wave simulator
//!
//! Runs the axisymmetric spectral-element solver on a mesh file, or on a
//! small homogeneous test model when no mesh is given. With `--ranks N` the
//! elements are split into N horizontal stripes, each integrated by its own
//! thread.
//!
//! Usage:
//!   cargo run --release --bin seismic-solver -- --config run.json --mesh mesh.json
//!   cargo run --release --bin seismic-solver -- --config run.json --ranks 4

use anyhow::{Context, bail};
use clap::Parser;
use math_seismic::comm::{Communicator, SerialComm, ThreadGroup};
use math_seismic::domain::{DomainBuilder, MemorySink, StationSink, UniformNr};
use math_seismic::mesh::{MaterialSpec, MeshData, partition_stripes, rectangular_meridian};
use math_seismic::{SolverConfig, SpectralContext, estimate_dt};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "seismic-solver")]
#[command(about = "Axisymmetric spectral-element seismic wave solver")]
struct Args {
    /// Path to JSON run configuration (defaults apply when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to JSON mesh; a homogeneous test block is used when absent
    #[arg(short, long)]
    mesh: Option<PathBuf>,

    /// Number of in-process ranks
    #[arg(short, long, default_value_t = 1)]
    ranks: usize,

    /// Station records output file
    #[arg(short, long, default_value = "seismograms.json")]
    output: PathBuf,
}

/// 10 km x 10 km granite-like block, axisymmetric
fn default_mesh() -> MeshData {
    let granite = MaterialSpec::Isotropic {
        rho: 2700.0,
        vp: 5800.0,
        vs: 3200.0,
        q_mu: None,
    };
    rectangular_meridian(1.0e4, -1.0e4, 0.0, 8, 8, granite, 1)
}

fn run_rank(
    comm: Box<dyn Communicator>,
    mesh: &MeshData,
    ctx: Arc<SpectralContext>,
    config: &SolverConfig,
    partition: Vec<usize>,
    dt: f64,
    sink: Box<dyn StationSink>,
) -> math_seismic::Result<()> {
    let mut builder = DomainBuilder::new(mesh, ctx)
        .partition(partition)
        .dt(dt)
        .relaxation_times(config.relaxation_times.clone())
        .sink(sink)
        .dump_interval(config.dump_interval);
    if let Some(nr) = config.nr_override {
        builder = builder.policy(UniformNr(nr));
    }
    if let Some(src) = &config.source {
        builder = builder.source(src.to_source(dt, config.total_steps));
    }
    for station in &config.stations {
        builder = builder.station(station.clone());
    }

    let mut domain = builder.build(comm)?;
    log::info!("{}", domain.verbose()?.trim_end());
    if config.measure_cost > 0 {
        let cost = domain.report_cost(config.measure_cost)?;
        log::info!("{}", cost.trim_end());
    }
    if let Some(init) = config.random_init {
        domain.init_displ_tiny_random(init.factor, init.seed);
    }
    config.newmark(dt).solve(&mut domain)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SolverConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => SolverConfig::default(),
    };
    let mesh = match &args.mesh {
        Some(path) => {
            MeshData::from_file(path).with_context(|| format!("loading mesh {}", path.display()))?
        }
        None => default_mesh(),
    };
    if args.ranks == 0 {
        bail!("--ranks must be at least 1");
    }
    let max_nr = mesh
        .elements
        .iter()
        .map(|e| e.nr)
        .chain(config.nr_override)
        .fold(config.max_nr, usize::max);

    let ctx = Arc::new(SpectralContext::init(config.npol, max_nr)?);
    let dt = match config.dt {
        Some(dt) => dt,
        None => config.courant * estimate_dt(&mesh, &ctx)?,
    };
    log::info!(
        "Mesh: {} elements, npol = {}, max nr = {}, dt = {:.4e} s, {} steps",
        mesh.num_elements(),
        config.npol,
        max_nr,
        dt,
        config.total_steps
    );

    let partition = partition_stripes(&mesh, args.ranks);
    let sink = MemorySink::new();
    let results: Vec<math_seismic::Result<()>> = if args.ranks == 1 {
        vec![run_rank(
            Box::new(SerialComm::new()),
            &mesh,
            Arc::clone(&ctx),
            &config,
            partition,
            dt,
            Box::new(sink.clone()),
        )]
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = ThreadGroup::create(args.ranks)
                .into_iter()
                .map(|comm| {
                    let (mesh, ctx, config) = (&mesh, Arc::clone(&ctx), &config);
                    let (partition, sink) = (partition.clone(), sink.clone());
                    scope.spawn(move || {
                        run_rank(Box::new(comm), mesh, ctx, config, partition, dt, Box::new(sink))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(_) => Err(math_seismic::SolverError::Config("rank thread panicked".into())),
                })
                .collect()
        })
    };

    let mut failed = false;
    for (rank, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            eprintln!("rank {}: {}", rank, e);
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }

    let records = sink.snapshot();
    fs::write(&args.output, serde_json::to_string_pretty(&records)?)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!("Wrote {} stations to {}", records.len(), args.output.display());
    Ok(())
}
