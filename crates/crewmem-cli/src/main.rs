use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crewmem::MemoryCoordinator;
use crewmem::config::Config;
use crewmem_cli::commands::{
    CleanupCommand, ClearCommand, ConfigCommand, ConsolidateCommand, EntityCommand,
    MemoryCommand, StatsCommand,
};
use crewmem_cli::error::CliResult;
use crewmem_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crewmem-cli")]
#[command(about = "crewmem CLI - Administration tool for crew memory")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show memory statistics for a tenant")]
    Stats(StatsCommand),

    #[clap(about = "Run an on-demand cleanup pass")]
    Cleanup(CleanupCommand),

    #[clap(about = "Promote important short-term memories to long-term")]
    Consolidate(ConsolidateCommand),

    #[clap(about = "Delete all memory for a tenant")]
    Clear(ClearCommand),

    #[clap(about = "Tenant configuration commands")]
    Config(ConfigCommand),

    #[clap(about = "Memory inspection commands")]
    Memory(MemoryCommand),

    #[clap(about = "Entity graph commands")]
    Entity(EntityCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    let coordinator = MemoryCoordinator::open(&config).await?;

    match &cli.command {
        Command::Stats(cmd) => cmd.execute(&coordinator, format).await,
        Command::Cleanup(cmd) => cmd.execute(&coordinator, format).await,
        Command::Consolidate(cmd) => cmd.execute(&coordinator, format).await,
        Command::Clear(cmd) => cmd.execute(&coordinator, format).await,
        Command::Config(cmd) => cmd.execute(&coordinator, format).await,
        Command::Memory(cmd) => cmd.execute(&coordinator, format).await,
        Command::Entity(cmd) => cmd.execute(&coordinator, format).await,
    }
}

/// Warnings only by default so table output stays readable
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
