//! Ferry CLI
//!
//! Command-line producer for the Ferry job queue.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry job queue CLI", long_about = None)]
struct Cli {
    /// Job queue URL
    #[arg(long, global = true, env = "QUEUE_URL")]
    queue_url: Option<String>,

    /// Idempotency window in seconds, used when printing tokens
    #[arg(long, global = true, env = "IDEMPOTENCY_WINDOW", default_value_t = 3600)]
    idempotency_window: u64,

    /// Accept message bodies without a version field
    #[arg(long, global = true)]
    allow_unversioned: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "ferry_client=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config {
        queue_url: cli.queue_url,
        idempotency_window: Duration::from_secs(cli.idempotency_window),
        allow_unversioned: cli.allow_unversioned,
    };

    handle_command(cli.command, &config).await
}
