use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use pmon_supervisor::{ProcessMonitorConfig, SupervisionRoot, DEFAULT_SHUTDOWN_GRACE};

mod watchdog;

const DEFAULT_LOG_FILE: &str = "processmonitor.log";

/// Keeps configured processes running and registry values in place
#[derive(Parser, Debug)]
#[command(name = "processmonitor", author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Also append log output to this file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Write a watchdog script for this monitor and exit
    #[arg(long)]
    create_watchdog: bool,

    /// Run duration in seconds (for testing)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug, &args.log_file)?;

    if args.create_watchdog {
        let dir = std::env::current_dir().context("Failed to read current directory")?;
        let path = watchdog::create_watchdog_script(&dir, &args.config)?;
        info!("Watchdog script created: {}", path.display());
        return Ok(());
    }

    info!("Starting Process Monitor v{}", pmon_supervisor::VERSION);
    info!("Config file: {}", args.config);

    let config = ProcessMonitorConfig::load_from_file(&args.config)?;
    info!(
        "Loaded configuration for {} processes and {} registry monitors",
        config.processes.len(),
        config.registry_monitors.len()
    );

    let handle = SupervisionRoot::new(config).spawn();

    if let Some(duration) = args.run_duration {
        info!("Running for {} seconds (test mode)", duration);
        tokio::select! {
            _ = tokio::time::sleep(tokio::time::Duration::from_secs(duration)) => {}
            _ = setup_signal_handlers() => {}
        }
    } else {
        setup_signal_handlers().await;
    }

    info!("Received shutdown signal, stopping all processes...");
    if !handle.shutdown(DEFAULT_SHUTDOWN_GRACE).await {
        warn!("Some monitors were aborted during shutdown");
    }
    info!("Process monitor shutdown complete");

    Ok(())
}

fn initialize_logging(debug: bool, log_file: &Path) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file.display()))?;
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(true))
        .with(file_layer)
        .init();

    Ok(())
}

async fn setup_signal_handlers() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
