//! Tessera Node - UTXO ledger consensus core.
//!
//! This is the main entry point for the tessera-node binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Tessera ledger node.
#[derive(Parser, Debug)]
#[command(name = "tessera-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tessera-node.toml")]
    config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Network (mainnet, testnet, regtest)
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Enable the built-in CPU miner
    #[arg(long)]
    mine: bool,

    /// Mining reward address
    #[arg(long)]
    mining_address: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Tessera node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load(&args.config, &args)?;
    if args.init_config {
        config.save(&args.config)?;
        info!("Wrote configuration to {:?}", args.config);
        return Ok(());
    }
    info!("Network: {}", config.network);
    info!("Data directory: {:?}", config.data_dir);

    let node = Node::start(config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    let tip = node.handle().current_tip();
    info!(height = tip.height, hash = %tip.hash, "Shutdown signal received");

    node.shutdown().await?;
    info!("Tessera node stopped");
    Ok(())
}
