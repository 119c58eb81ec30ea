//! PixelSwarm CLI.
//!
//! Runs a swarm of neighbourhood proposers over one canvas, either for a
//! fixed duration or until the configured age limit, then stops and prints
//! the run stats.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pixelswarm::engine::{Coordinator, NeighborhoodProposer, Proposer, SyncConfig, SyncStats, WorkerProfile};

#[derive(Parser)]
#[command(name = "pixelswarm")]
#[command(version)]
#[command(about = "Concurrent tile workers painting one shared canvas")]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Canvas width in pixels
    #[arg(long)]
    width: Option<usize>,

    /// Canvas height in pixels
    #[arg(long)]
    height: Option<usize>,

    /// Number of workers
    #[arg(long)]
    workers: Option<usize>,

    /// Stop once the canvas reaches this age
    #[arg(long)]
    age_limit: Option<u64>,

    /// Write one PNG per applied cycle into this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Export the final canvas here on stop
    #[arg(long)]
    output: Option<PathBuf>,

    /// Base RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run time in seconds when no age limit is set
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn build_config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => SyncConfig::default(),
        };

        if let Some(w) = self.width {
            config.width = w;
        }
        if let Some(h) = self.height {
            config.height = h;
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if self.age_limit.is_some() {
            config.age_limit = self.age_limit;
        }
        if self.frames_dir.is_some() {
            config.frames_dir = self.frames_dir.clone();
        }
        if self.output.is_some() {
            config.final_output = self.output.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn print_stats(stats: &SyncStats) {
    println!("age:                {}", stats.age);
    println!("cycles:             {}", stats.cycles);
    println!("empty wakes:        {}", stats.empty_wakes);
    println!("proposals received: {}", stats.proposals_received);
    println!("proposals applied:  {}", stats.proposals_applied);
    println!("proposals stale:    {}", stats.proposals_stale);
    println!("proposals rejected: {}", stats.proposals_rejected);
    println!("cells written:      {}", stats.cells_written);
    println!("frames exported:    {}", stats.frames_exported);
    println!("export failures:    {}", stats.export_failures);
    println!("proposer errors:    {}", stats.proposer_errors);
    println!("empty rounds:       {}", stats.empty_rounds);
    println!("out of bounds:      {}", stats.out_of_bounds);
    if let Some(first) = &stats.first_bounds_error {
        println!("first bounds error: {first}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = cli.build_config()?;
    let seed = config.seed;
    let age_limit = config.age_limit;
    info!(
        width = config.width,
        height = config.height,
        workers = config.workers,
        ?age_limit,
        "starting swarm"
    );

    let mut coordinator = Coordinator::with_proposers(config, move |profile: &WorkerProfile| {
        Box::new(NeighborhoodProposer::new(seed, profile)) as Box<dyn Proposer>
    })?;
    coordinator.run()?;

    let started = Instant::now();
    let stats = if age_limit.is_some() {
        coordinator.wait()?
    } else {
        let duration = Duration::from_secs(cli.duration);
        while started.elapsed() < duration && !coordinator.is_finished() {
            thread::sleep(Duration::from_millis(50));
        }
        coordinator.stop()?
    };

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "swarm finished");
    print_stats(&stats);
    Ok(())
}
