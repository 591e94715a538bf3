use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ec_mini::sim::SimMaster;
use ec_mini::{AppConfig, Runtime};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Minimal cyclic fieldbus master")]
struct Args {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many milliseconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    run_for_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_path(path).with_context(|| {
            format!("loading config from {}", path.display())
        })?,
        None => AppConfig::default(),
    };

    // No NIC driver here, so the bus is simulated with the expected devices.
    let api = SimMaster::mirroring(&config.devices);
    let runtime = Runtime::start(api, config)?;

    let deadline = async {
        match args.run_for_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("Interrupted.");
        }
        _ = deadline => info!("Run time elapsed."),
        _ = cycle_halted(&runtime) => warn!("Cyclic task halted on its own."),
    }

    let stats = runtime.stats();
    let state = tokio::task::spawn_blocking(move || runtime.stop()).await??;

    info!(
        "Ran {} ticks: {} read failures, {} write failures, {} overruns.",
        stats.ticks, stats.read_failures, stats.write_failures, stats.overruns
    );
    if let Some(state) = state {
        info!("Final cycle phase: {:?}.", state.phase);
    }
    Ok(())
}

/// Resolves once a running cycle has faulted. Never resolves without one.
async fn cycle_halted<A: ec_master::MasterApi>(runtime: &Runtime<A>) {
    if !runtime.is_cycling() {
        return std::future::pending().await;
    }
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    loop {
        poll.tick().await;
        if !runtime.is_cycling() {
            return;
        }
    }
}
