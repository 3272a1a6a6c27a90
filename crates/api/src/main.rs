//! Attention Monitor - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "attention-server", version, about = "Webcam attention monitor")]
struct Args {
    /// Configuration file, layered under ATTENTION_* variables
    #[arg(long, env = "ATTENTION_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config.logging)?;

    info!("=== Attention Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Configuration loaded from {}", path);
    }

    run_server(config).await
}
