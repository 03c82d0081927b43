//! Launch one `machine` process per configured id
//!
//! Usage:
//!   start_all
//!   start_all --config config/machines.toml --log-dir logs
//!
//! Machines start in ascending id order with a short stagger. Lower ids dial
//! higher ids, and each machine's connect retry window absorbs whatever
//! start-up race the stagger leaves. Ctrl+C stops every child.

use anyhow::{Context, Result};
use clap::Parser;
use codec::ActorId;
use machine_config::{load_config, DEFAULT_CONFIG_PATH};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

/// Grace period for children to exit after Ctrl+C before they are killed
const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "start_all")]
#[command(about = "Start every machine in the peer table")]
struct Args {
    /// Path to the peer table (TOML or JSON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for the machines' log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Delay between process launches in milliseconds
    #[arg(long, default_value_t = 500)]
    stagger_ms: u64,

    /// Path to the `machine` binary (defaults to the one next to this binary)
    #[arg(long)]
    machine_bin: Option<PathBuf>,

    /// Log level passed to this launcher and to every machine
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = load_config(Some(&args.config))
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    let machine_bin = match &args.machine_bin {
        Some(path) => path.clone(),
        None => std::env::current_exe()
            .context("Cannot locate current executable")?
            .with_file_name(format!("machine{}", std::env::consts::EXE_SUFFIX)),
    };

    let ids = config.machine_ids();
    info!(machines = ids.len(), binary = ?machine_bin, "Starting machines");

    let mut children: Vec<(String, Child)> = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        if index > 0 {
            sleep(Duration::from_millis(args.stagger_ms)).await;
        }

        match machine_command(&machine_bin, *id, &args).spawn() {
            Ok(child) => {
                info!(machine = %id, pid = ?child.id(), "Machine launched");
                children.push((id.to_string(), child));
            }
            Err(e) => {
                error!(machine = %id, "Failed to launch machine: {}", e);
                stop_all(&mut children).await;
                return Err(e).with_context(|| format!("Failed to launch machine {}", id));
            }
        }
    }

    let interrupted = tokio::select! {
        _ = wait_all(&mut children) => false,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            true
        }
    };

    if interrupted {
        info!("Shutting down all machines...");
        stop_all(&mut children).await;
    } else {
        info!("All machines exited");
    }

    Ok(())
}

/// Command line for one child machine
fn machine_command(machine_bin: &Path, id: ActorId, args: &Args) -> Command {
    let mut command = Command::new(machine_bin);
    command
        .arg(id.to_string())
        .arg("--config")
        .arg(&args.config)
        .arg("--log-level")
        .arg(&args.log_level)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(log_dir) = &args.log_dir {
        command.arg("--log-dir").arg(log_dir);
    }
    command
}

async fn wait_all(children: &mut [(String, Child)]) {
    for (id, child) in children.iter_mut() {
        match child.wait().await {
            Ok(status) => info!(machine = %id, %status, "Machine exited"),
            Err(e) => warn!(machine = %id, "Failed to wait for machine: {}", e),
        }
    }
}

/// Give children a moment to finish their own Ctrl+C handling, then kill
async fn stop_all(children: &mut [(String, Child)]) {
    if timeout(CHILD_EXIT_TIMEOUT, wait_all(children)).await.is_ok() {
        return;
    }

    for (id, child) in children.iter_mut() {
        if let Ok(None) = child.try_wait() {
            warn!(machine = %id, "Machine still running, killing it");
            if let Err(e) = child.kill().await {
                error!(machine = %id, "Failed to kill machine: {}", e);
            }
        }
    }
}
