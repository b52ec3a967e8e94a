//! Eligibility Server
//!
//! Runs the worker eligibility engine as a standalone HTTP service.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use worker_eligibility::{server, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "eligibility-server")]
#[command(about = "Worker eligibility threshold service")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ELIGIBILITY_CONFIG")]
    config: Option<PathBuf>,

    /// Server port
    #[arg(short, long, env = "ELIGIBILITY_PORT")]
    port: Option<u16>,

    /// Server host
    #[arg(long, env = "ELIGIBILITY_HOST")]
    host: Option<String>,

    /// SQLite database path
    #[arg(short, long, env = "ELIGIBILITY_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("worker_eligibility=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    config.apply_env()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.path = db_path;
    }
    config.validate()?;

    info!("Starting eligibility server");
    info!(
        "  Config: {}",
        args.config
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string())
    );
    info!("  Accepted tokens: {}", config.auth.tokens.len());

    server::run_server(config).await
}
