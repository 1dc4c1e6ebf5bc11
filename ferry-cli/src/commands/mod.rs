//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue a job for an object
    Enqueue {
        /// Object key
        key: String,

        /// Bucket holding the object
        #[arg(long, env = "BUCKET_NAME")]
        bucket: String,
    },
    /// Print the message body for a job without sending it
    Encode {
        /// Object key
        key: String,

        /// Bucket holding the object
        #[arg(long, env = "BUCKET_NAME")]
        bucket: String,
    },
    /// Decode a message body from a file or stdin
    Inspect {
        /// File holding the body; stdin when omitted
        file: Option<PathBuf>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Enqueue { key, bucket } => job::enqueue(config, &bucket, &key).await,
        Commands::Encode { key, bucket } => job::encode(&bucket, &key),
        Commands::Inspect { file } => job::inspect(config, file.as_deref()),
    }
}
