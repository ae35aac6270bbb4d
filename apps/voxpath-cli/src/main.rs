use std::io;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::IVec3;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use voxpath_common::Volume;
use voxpath_kernel::{CollisionGrid, SearchOutcome, Step, find_path, path_bytes, trace};
use voxpath_worker::{JobRequest, Message, Payload, WireFormat, WorkerConfig, WorkerHandle};

#[derive(Parser)]
#[command(name = "voxpath", about = "Background pathfinding over static voxel worlds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run the path worker over stdin/stdout
    Serve {
        /// Wire format: json (one value per line) or cbor (length-prefixed frames)
        #[arg(short, long)]
        format: Option<WireFormat>,
        /// YAML worker config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Search a JSON scene file and print the route
    Find {
        /// Scene file: {"size": [w,h,d], "blocked": [[x,y,z],..], "start": [..], "dest": [..]}
        scene: PathBuf,
    },
    /// Push a batch of jobs through a worker thread and report timings
    Bench {
        /// Width and height of the volume
        #[arg(short, long, default_value = "64")]
        size: u32,
        /// Depth of the volume
        #[arg(short, long, default_value = "4")]
        depth: u32,
        /// Number of jobs to queue
        #[arg(short, long, default_value = "200")]
        jobs: u64,
    },
}

#[derive(Debug, Deserialize)]
struct Scene {
    size: [u32; 3],
    #[serde(default)]
    blocked: Vec<[i32; 3]>,
    start: [i32; 3],
    dest: [i32; 3],
}

impl Scene {
    fn collision(&self) -> anyhow::Result<CollisionGrid> {
        let [w, h, d] = self.size;
        let mut grid = CollisionGrid::zeroed(Volume::new(w, h, d)?);
        for &cell in &self.blocked {
            grid.set_blocked(IVec3::from_array(cell), true)
                .with_context(|| format!("blocked cell {cell:?}"))?;
        }
        Ok(grid)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    // stdout carries protocol traffic in `serve`, so logs go to stderr.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("voxpath v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", voxpath_common::crate_info());
            println!("kernel: {}", voxpath_kernel::crate_info());
            println!("worker: {}", voxpath_worker::crate_info());
        }
        Commands::Serve { format, config } => {
            let mut worker_config = match config {
                Some(path) => WorkerConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => WorkerConfig::default(),
            };
            if let Some(format) = format {
                worker_config.format = format;
            }
            tracing::info!(format = ?worker_config.format, "serving on stdio");
            let stdin = io::stdin().lock();
            let stdout = io::stdout().lock();
            let stats = voxpath_worker::serve(stdin, stdout, &worker_config)?;
            tracing::info!(
                jobs = stats.jobs,
                found = stats.found,
                no_path = stats.no_path,
                failed = stats.failed,
                "worker finished"
            );
        }
        Commands::Find { scene } => {
            let text = std::fs::read_to_string(&scene)
                .with_context(|| format!("reading scene {}", scene.display()))?;
            let scene: Scene = serde_json::from_str(&text).context("parsing scene")?;
            let grid = scene.collision()?;
            let start = IVec3::from_array(scene.start);
            let dest = IVec3::from_array(scene.dest);

            let began = Instant::now();
            match find_path(&grid, start, dest)? {
                SearchOutcome::Found(route) => {
                    println!(
                        "path: {} steps, cost {}, {} cells expanded in {:?}",
                        route.steps.len(),
                        route.cost,
                        route.expanded,
                        began.elapsed()
                    );
                    println!("encoded: {} bytes", path_bytes(&route.steps).len());
                    let cells = trace(start, &route.steps)?;
                    for (cell, record) in cells.iter().skip(1).zip(&route.steps) {
                        let step = Step::decode(*record)?;
                        println!(
                            "  {:>4} {:?} {:?} climb {:+} -> {cell}",
                            format!("{record:#06x}"),
                            step.reach,
                            step.heading,
                            step.climb
                        );
                    }
                }
                SearchOutcome::Exhausted { expanded } => {
                    println!("no path ({expanded} cells expanded in {:?})", began.elapsed());
                }
            }
        }
        Commands::Bench { size, depth, jobs } => {
            println!("Worker bench: {size}x{size}x{depth}, {jobs} jobs");
            let volume = Volume::new(size, size, depth)?;
            let collision = vec![0u8; volume.cell_count()];
            let far = IVec3::new(size as i32 - 1, size as i32 - 1, depth as i32 - 1);

            let handle = WorkerHandle::spawn(WorkerConfig::default())?;
            handle.post(Message::Init([size, size, depth]))?;
            let began = Instant::now();
            for id in 0..jobs {
                let dest = if id % 2 == 0 { far } else { far.with_z(0) };
                let job = JobRequest::new(id, collision.clone(), IVec3::ZERO, dest);
                handle.post(Message::Job(job))?;
            }
            let mut steps = 0usize;
            for _ in 0..jobs {
                if let Payload::Path(path) = handle.recv()?.payload {
                    steps += path.len();
                }
            }
            let elapsed = began.elapsed();
            let stats = handle.shutdown()?;
            println!(
                "Done: {} jobs in {elapsed:?}, {steps} steps total, avg {:?}, min {:?}, max {:?}",
                stats.jobs,
                stats.latency.average(),
                stats.latency.min(),
                stats.latency.max()
            );
        }
    }

    Ok(())
}
