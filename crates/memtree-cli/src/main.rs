use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use memtree::config::Config;
use memtree::engine::MemoryEngine;
use memtree_cli::commands::{ConfigCommand, MemoryCommand, ReorganizeCommand, StatsCommand};
use memtree_cli::error::CliResult;
use memtree_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memtree-cli")]
#[command(about = "memtree CLI - Inspect and edit a memtree store")]
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
    #[clap(about = "Memory file commands")]
    Memory(MemoryCommand),

    #[clap(about = "Show tier statistics")]
    Stats(StatsCommand),

    #[clap(about = "Run one reorganizer cycle now")]
    Reorganize(ReorganizeCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
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

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    if let Command::Config(cmd) = &cli.command {
        return cmd.execute(&config, cli.config.as_deref(), format).await;
    }

    let engine = Arc::new(MemoryEngine::open(&config).await?);
    tracing::debug!("Opened store at {}", config.storage.memories_dir().display());

    let result = match &cli.command {
        Command::Memory(cmd) => cmd.execute(&engine, format).await,
        Command::Stats(cmd) => cmd.execute(&engine, format).await,
        Command::Reorganize(cmd) => {
            cmd.execute(Arc::clone(&engine), config.reorganizer.clone(), format)
                .await
        }
        Command::Config(_) => Ok(()),
    };

    engine.save_metadata().await?;
    result
}
