//! Batch poller
//!
//! Runs the receive / dispatch / commit loop. Each worker owns one loop; a
//! batch that has been received is always dispatched and committed before
//! the worker looks at the shutdown flag again.

use anyhow::{Result, anyhow};
use ferry_client::{QueueBackend, QueueError, QueueResult, RawMessage};
use ferry_core::domain::outcome::DeliveryOutcome;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{DispatchStats, Dispatcher};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Batch poller feeding received messages to the dispatcher
pub struct BatchPoller {
    config: Config,
    queue: Arc<dyn QueueBackend>,
    dispatcher: Dispatcher,
    stats: Arc<DispatchStats>,
}

impl BatchPoller {
    /// Creates a new batch poller
    pub fn new(
        config: Config,
        queue: Arc<dyn QueueBackend>,
        dispatcher: Dispatcher,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            config,
            queue,
            dispatcher,
            stats,
        }
    }

    /// Runs `worker_count` workers until shutdown is signalled or one of
    /// them gives up on the queue
    ///
    /// A worker that gives up raises the shutdown flag so the others drain
    /// their current batch and stop; its error is then returned.
    pub async fn run(self: Arc<Self>, shutdown: Arc<watch::Sender<bool>>) -> Result<()> {
        info!(
            "Starting {} worker(s) (batch size: {}, wait time: {:?})",
            self.config.worker_count, self.config.batch_size, self.config.wait_time
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.worker_count {
            let poller = Arc::clone(&self);
            workers.spawn(poller.run_worker(worker_id, shutdown.subscribe()));
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined
                .map_err(|e| anyhow!("worker task failed: {}", e))
                .and_then(|result| result);

            if let Err(e) = result {
                error!("Worker stopped with error: {:#}", e);
                shutdown.send_replace(true);
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!("All workers stopped");
                Ok(())
            }
        }
    }

    async fn run_worker(
        self: Arc<Self>,
        worker_id: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        debug!("Worker {} started", worker_id);

        let mut consecutive_failures = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.receive() => received,
            };

            match received {
                Ok(messages) => {
                    consecutive_failures = 0;
                    backoff = INITIAL_BACKOFF;

                    if messages.is_empty() {
                        debug!("Worker {}: no messages", worker_id);
                        continue;
                    }

                    self.handle_batch(worker_id, &messages).await;
                }
                Err(e) => {
                    consecutive_failures += 1;

                    if consecutive_failures >= self.config.max_receive_failures {
                        error!(
                            "Worker {}: receive failed {} times in a row, giving up",
                            worker_id, consecutive_failures
                        );
                        return Err(anyhow!(
                            "queue unavailable after {} consecutive receive failures: {}",
                            consecutive_failures,
                            e
                        ));
                    }

                    warn!(
                        "Worker {}: receive failed (attempt {}/{}): {}",
                        worker_id, consecutive_failures, self.config.max_receive_failures, e
                    );
                    warn!("Retrying in {:?}...", backoff);

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = time::sleep(backoff) => {}
                    }

                    // Exponential backoff with cap
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("Worker {} stopped", worker_id);
        Ok(())
    }

    /// Receives one batch, bounded by the long-poll wait plus the queue timeout
    async fn receive(&self) -> QueueResult<Vec<RawMessage>> {
        let limit = self.config.receive_timeout();
        time::timeout(
            limit,
            self.queue
                .receive_batch(self.config.batch_size, self.config.wait_time),
        )
        .await
        .unwrap_or_else(|_| Err(QueueError::Timeout(limit)))
    }

    /// Dispatches a batch and commits every outcome to the queue
    async fn handle_batch(&self, worker_id: usize, messages: &[RawMessage]) -> Vec<DeliveryOutcome> {
        let outcomes = self.dispatcher.process_batch(messages).await;

        for (message, outcome) in messages.iter().zip(&outcomes) {
            self.commit(message, outcome).await;
            self.stats.record(outcome);
        }
        self.stats.record_batch();

        let count = |pred: fn(&DeliveryOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
        info!(
            "Worker {} processed {} message(s): {} acknowledged, {} retried, {} dead-lettered",
            worker_id,
            outcomes.len(),
            count(DeliveryOutcome::is_acknowledged),
            count(DeliveryOutcome::is_retry),
            count(DeliveryOutcome::is_dead_lettered)
        );

        outcomes
    }

    /// Applies one outcome to the queue
    ///
    /// A failed commit is only logged: the message stays in flight and the
    /// queue redelivers it once its visibility timeout lapses.
    async fn commit(&self, message: &RawMessage, outcome: &DeliveryOutcome) {
        let limit = self.config.queue_timeout;
        let result = match outcome {
            DeliveryOutcome::Acknowledged { .. } => {
                time::timeout(limit, self.queue.acknowledge(message)).await
            }
            DeliveryOutcome::Retry { .. } => {
                time::timeout(
                    limit,
                    self.queue
                        .return_to_queue(message, self.config.retry_delay),
                )
                .await
            }
            DeliveryOutcome::DeadLettered { reason } => {
                time::timeout(limit, self.queue.dead_letter(message, reason)).await
            }
        };

        match result.unwrap_or_else(|_| Err(QueueError::Timeout(limit))) {
            Ok(()) => debug!("Committed {} for message {}", outcome.label(), message.message_id),
            Err(e) => warn!(
                "Failed to commit {} for message {}, it will be redelivered: {}",
                outcome.label(),
                message.message_id,
                e
            ),
        }
    }
}
