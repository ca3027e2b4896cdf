//! crewmem daemon - runs scheduled memory maintenance

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crewmem::config::Config;
use crewmem::error::Result;
use crewmem::{MemoryCoordinator, MemoryScheduler};

/// crewmem - multi-tier semantic memory for AI agent crews
#[derive(Parser)]
#[command(name = "crewmem")]
#[command(about = "Semantic memory engine daemon for AI agent crews")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the maintenance scheduler until interrupted (default command)
    #[command(name = "serve")]
    Serve,
    /// Run a single maintenance pass over every tenant and exit
    #[command(name = "run-once")]
    RunOnce,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::RunOnce) => run_once(config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crewmem=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_scheduler(config: &Config) -> Result<MemoryScheduler> {
    let coordinator = Arc::new(MemoryCoordinator::open(config).await?);
    Ok(MemoryScheduler::new(coordinator, config.scheduler.clone()))
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting crewmem daemon");
    let scheduler = build_scheduler(&config).await?;

    if config.scheduler.enabled {
        scheduler.start().await;
    } else {
        tracing::warn!("Scheduler disabled in config; waiting for shutdown");
    }

    shutdown_signal().await;
    scheduler.stop().await;

    tracing::info!("crewmem daemon stopped");
    Ok(())
}

async fn run_once(config: Config) -> Result<()> {
    let scheduler = build_scheduler(&config).await?;
    let report = scheduler.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
