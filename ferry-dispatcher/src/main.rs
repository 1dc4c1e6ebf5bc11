//! Ferry Dispatcher
//!
//! A stateless worker that turns queued job descriptors into container tasks.
//!
//! Architecture:
//! - Configuration: Load settings from environment variables
//! - Services: Dispatch decisions (decode, launch, classify) and counters
//! - Scheduler: Batch polling, outcome commits and shutdown
//! - API: Optional health and stats endpoint
//!
//! The dispatcher long-polls the job queue, starts one task per job, and
//! acknowledges, returns or dead-letters every message according to the
//! launch outcome. Delivery is at-least-once; launches carry an idempotency
//! token when the launcher can deduplicate them.

mod api;
mod config;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::BatchPoller;
use crate::scheduler::shutdown::{listen_for_signals, wait_for_shutdown};
use crate::service::{DispatchStats, Dispatcher};
use ferry_client::{EcsLauncher, QueueBackend, SqsQueue, TaskLauncher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ferry_dispatcher=info,ferry_client=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ferry Dispatcher");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: queue_url={}, cluster={}, task_definition={}",
        config.queue_url, config.launch.cluster, config.launch.task_definition
    );

    // Initialize backends
    let mut sqs = SqsQueue::from_env(config.queue_url.clone()).await;
    match &config.dead_letter_queue_url {
        Some(url) => {
            info!("Dead-lettered messages go to {}", url);
            sqs = sqs.with_dead_letter_queue(url.clone());
        }
        None => warn!("DEAD_LETTER_QUEUE_URL not set, dead-lettered messages will be deleted"),
    }
    let queue: Arc<dyn QueueBackend> = Arc::new(sqs);
    let launcher: Arc<dyn TaskLauncher> = Arc::new(EcsLauncher::from_env().await);

    info!("Backends initialized");

    // Initialize services
    let dispatcher = Dispatcher::from_config(launcher, &config);
    if !dispatcher.deduplicates() {
        warn!("Task launcher cannot deduplicate launches, redelivered jobs may start twice");
    }
    let stats = Arc::new(DispatchStats::new());

    let (shutdown, _) = watch::channel(false);
    let shutdown = Arc::new(shutdown);

    // Start health endpoint
    if let Some(addr) = &config.health_bind_addr {
        let app = api::create_router(Arc::clone(&stats));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health endpoint to {}", addr))?;
        info!("Health endpoint listening on {}", addr);

        let stopped = wait_for_shutdown(shutdown.subscribe());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
            {
                error!("Health endpoint error: {}", e);
            }
        });
    }

    tokio::spawn(listen_for_signals(Arc::clone(&shutdown)));

    info!(
        "Worker count: {}, launch timeout: {:?}, queue timeout: {:?}",
        config.worker_count, config.launch_timeout, config.queue_timeout
    );

    // Start polling loop
    let poller = Arc::new(BatchPoller::new(config, queue, dispatcher, stats));
    if let Err(e) = poller.run(shutdown).await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    info!("Ferry Dispatcher stopped");
    Ok(())
}

/// Loads and validates configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
