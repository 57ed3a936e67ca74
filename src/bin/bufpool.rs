//! bufpool command-line tool
//!
//! Inspect the size-class table, print the effective configuration, or replay
//! a synthetic workload against an adaptive pool to see where calibration
//! settles.
//!
//! # Examples
//!
//! ```bash
//! # Show the size classes
//! bufpool classes
//!
//! # 8 workers, 93% of payloads ~1000 bytes, the rest up to 15000
//! bufpool simulate --threads 8 --typical-size 1000 --outlier-size 15000 --outlier-every 15
//!
//! # Effective configuration (file + BUFPOOL_* overrides)
//! bufpool --config bufpool.toml config
//! ```

use anyhow::Context;
use bufpool::pool::metrics::describe_metrics;
use bufpool::slab::{size_of, NUM_CLASSES};
use bufpool::{BufpoolConfig, PoolRegistry, PoolStats, StoreStats};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Self-calibrating byte buffer pool
#[derive(Parser, Debug)]
#[command(name = "bufpool")]
#[command(version = bufpool::VERSION)]
#[command(about = "Self-calibrating byte buffer pool", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "BUFPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "BUFPOOL_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a pool with a synthetic workload and report calibration
    Simulate(SimulateArgs),

    /// Print the size-class table
    Classes,

    /// Print the effective configuration as JSON
    Config,
}

/// Workload shape for `simulate`
#[derive(Args, Debug)]
struct SimulateArgs {
    /// Pool name
    #[arg(long, default_value = "simulate")]
    pool: String,

    /// Worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Get/put cycles per worker
    #[arg(short, long, default_value = "100000")]
    iterations: usize,

    /// Payload size of a typical request (bytes)
    #[arg(long, default_value = "1000")]
    typical_size: usize,

    /// Upper bound for outlier payloads (bytes)
    #[arg(long, default_value = "15000")]
    outlier_size: usize,

    /// Every n-th request is an outlier
    #[arg(long, default_value = "15")]
    outlier_every: usize,
}

#[derive(Serialize)]
struct SimulationReport {
    elapsed_ms: u128,
    cycles: usize,
    pool: PoolStats,
    store: StoreStats,
}

#[derive(Serialize)]
struct ClassRow {
    class: usize,
    min_bytes: usize,
    max_bytes: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;
    describe_metrics();

    let config = BufpoolConfig::load(cli.config.as_deref())
        .context("Failed to load bufpool configuration")?;

    match cli.command {
        Commands::Simulate(args) => simulate_command(&config, args),
        Commands::Classes => classes_command(),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "bufpool.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    // Console output goes to stderr so JSON reports stay clean on stdout
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Simulate command - replay a skewed size distribution from many workers
fn simulate_command(config: &BufpoolConfig, args: SimulateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.threads > 0, "--threads must be at least 1");
    anyhow::ensure!(args.outlier_every > 0, "--outlier-every must be at least 1");

    let registry = PoolRegistry::new(config);
    let pool = registry.pool(&args.pool);

    info!(
        pool = %args.pool,
        threads = args.threads,
        iterations = args.iterations,
        "Starting simulation"
    );

    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .context("Failed to start worker threads")?;

    let start = Instant::now();
    workers.install(|| {
        (0..args.threads).into_par_iter().for_each(|worker| {
            for i in 0..args.iterations {
                let size = payload_size(&args, worker, i);
                let mut buf = pool.get();
                buf.resize(size, b'x');
                pool.put(buf);
            }
        });
    });
    let elapsed = start.elapsed();

    info!(
        serve_size = pool.serve_size(),
        discard_size = ?pool.discard_size(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Simulation finished"
    );

    let report = SimulationReport {
        elapsed_ms: elapsed.as_millis(),
        cycles: args.threads * args.iterations,
        pool: pool.stats(),
        store: registry.store().stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Deterministic size sequence: mostly typical, every n-th an outlier
fn payload_size(args: &SimulateArgs, worker: usize, i: usize) -> usize {
    if i % args.outlier_every == 0 {
        let spread = args.outlier_size.max(1);
        i.wrapping_mul(7919).wrapping_add(worker.wrapping_mul(104_729)) % spread + 1
    } else {
        args.typical_size
    }
}

/// Classes command - print the size-class table
fn classes_command() -> anyhow::Result<()> {
    let rows: Vec<ClassRow> = (0..NUM_CLASSES)
        .map(|class| ClassRow {
            class,
            min_bytes: if class == 0 { 0 } else { size_of(class - 1) + 1 },
            max_bytes: size_of(class),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
