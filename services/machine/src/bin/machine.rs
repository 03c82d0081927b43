//! Lamport virtual machine - one process per configured machine id
//!
//! Usage:
//!   machine 1
//!   machine 2 --config config/machines.toml --log-dir logs
//!   machine 3 --rate 4 --seed 42 --log-level debug

use anyhow::{Context, Result};
use clap::Parser;
use codec::ActorId;
use machine_actors::{Machine, MachineOptions};
use machine_config::{load_config, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "machine")]
#[command(about = "Lamport logical clock virtual machine")]
#[command(version)]
struct Args {
    /// Machine id from the peer table
    id: u32,

    /// Path to the peer table (TOML or JSON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for log_<id>.txt (overrides simulation.log_dir)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Fixed tick rate in ticks per second instead of a random draw
    #[arg(long)]
    rate: Option<u32>,

    /// Seed for the tick-rate draw and action choices
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    if let Err(e) = run(args).await {
        error!("Machine failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let id = ActorId::new(args.id);
    info!(machine = %id, config = ?args.config, "Starting Lamport machine");

    let config = load_config(Some(&args.config))
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    let options = MachineOptions {
        log_dir: args.log_dir,
        rate: args.rate,
        seed: args.seed,
    };
    let machine = Machine::new(&config, id, options)
        .with_context(|| format!("Failed to set up machine {}", id))?;

    let summary = machine
        .run_until(shutdown_signal())
        .await
        .with_context(|| format!("Machine {} could not start", id))?;

    match summary {
        Some(summary) => info!(
            machine = %id,
            clock = summary.clock,
            events = summary.events_processed,
            "Shutdown complete"
        ),
        None => info!(machine = %id, "Shutdown complete (tick loop aborted)"),
    }
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received shutdown signal");
}
