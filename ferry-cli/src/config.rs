//! Configuration module
//!
//! Handles CLI configuration shared by every command.

use anyhow::{Result, anyhow};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the job queue; only needed by commands that talk to it
    pub queue_url: Option<String>,

    /// Width of the windows used when deriving idempotency tokens
    pub idempotency_window: Duration,

    /// Accept version-less message bodies when decoding
    pub allow_unversioned: bool,
}

impl Config {
    pub fn require_queue_url(&self) -> Result<&str> {
        self.queue_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("no queue URL given; pass --queue-url or set QUEUE_URL"))
    }
}
