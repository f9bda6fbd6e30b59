//! memtree daemon - runs the background reorganizer over a memory store

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use memtree::config::Config;
use memtree::engine::MemoryEngine;
use memtree::error::{MemoryError, Result};
use memtree::reorganizer::Reorganizer;

/// memtree - Persistent tiered text memory for agents
#[derive(Parser)]
#[command(name = "memtree")]
#[command(about = "A persistent, tiered text memory store for agents")]
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
    /// Run the reorganizer until interrupted (default command)
    #[command(name = "serve")]
    Serve,
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

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,memtree=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting memtree daemon");

    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);
    tracing::info!("Memory root: {}", config.storage.memories_dir().display());

    let engine = Arc::new(MemoryEngine::open(&config).await?);
    for stats in engine.router().stats() {
        tracing::info!(
            "{} tier: {} entries, {}/{} bytes",
            stats.tier,
            stats.entries,
            stats.used_bytes,
            stats.budget_bytes
        );
    }

    let handle = if config.reorganizer.enabled {
        Some(Reorganizer::new(Arc::clone(&engine), config.reorganizer.clone()).spawn())
    } else {
        tracing::info!("Reorganizer disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MemoryError::Storage(format!("Failed to listen for shutdown signal: {e}")))?;
    tracing::info!("Shutdown requested");

    if let Some(handle) = handle {
        handle.shutdown().await;
    }
    engine.save_metadata().await?;

    tracing::info!("memtree daemon stopped");
    Ok(())
}
