//! Dispatch service
//!
//! Turns received queue messages into task launches. Each message of a batch
//! is handled in its own task, so one malformed body or one hanging launch
//! never decides the outcome of another message.

use ferry_client::{LaunchError, RawMessage, TaskLauncher};
use ferry_core::domain::idempotency::IdempotencyPolicy;
use ferry_core::domain::launch::LaunchTemplate;
use ferry_core::domain::outcome::DeliveryOutcome;
use ferry_core::dto::job::{DecodeOptions, decode_job};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;

const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Decides the outcome of every message in a batch
#[derive(Clone)]
pub struct Dispatcher {
    launcher: Arc<dyn TaskLauncher>,
    template: Arc<LaunchTemplate>,
    policy: IdempotencyPolicy,
    decode_options: DecodeOptions,
    launch_timeout: Duration,
}

impl Dispatcher {
    pub fn new(launcher: Arc<dyn TaskLauncher>, template: LaunchTemplate) -> Self {
        Self {
            launcher,
            template: Arc::new(template),
            policy: IdempotencyPolicy::default(),
            decode_options: DecodeOptions::default(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }

    /// Creates a dispatcher with every knob taken from `config`
    pub fn from_config(launcher: Arc<dyn TaskLauncher>, config: &Config) -> Self {
        Self::new(launcher, config.launch.clone())
            .with_idempotency(IdempotencyPolicy::new(config.idempotency_window))
            .with_decode_options(DecodeOptions {
                allow_unversioned: config.allow_unversioned,
            })
            .with_launch_timeout(config.launch_timeout)
    }

    pub fn with_idempotency(mut self, policy: IdempotencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Whether launches carry an idempotency token
    pub fn deduplicates(&self) -> bool {
        self.launcher.supports_deduplication()
    }

    /// Processes a batch and returns one outcome per message, in input order
    pub async fn process_batch(&self, messages: &[RawMessage]) -> Vec<DeliveryOutcome> {
        debug!("Dispatching batch of {} message(s)", messages.len());

        let handles: Vec<_> = messages
            .iter()
            .map(|message| self.spawn_message_task(message.clone()))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, message) in handles.into_iter().zip(messages) {
            let outcome = handle.await.unwrap_or_else(|e| {
                error!("Task for message {} failed: {}", message.message_id, e);
                DeliveryOutcome::Retry {
                    reason: format!("message task failed: {}", e),
                }
            });
            outcomes.push(outcome);
        }

        outcomes
    }

    fn spawn_message_task(&self, message: RawMessage) -> JoinHandle<DeliveryOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.process_message(&message).await })
    }

    async fn process_message(&self, message: &RawMessage) -> DeliveryOutcome {
        let submission = match decode_job(&message.body, self.decode_options) {
            Ok(submission) => submission,
            Err(e) => {
                warn!(
                    "Dead-lettering message {}: {} (body: {})",
                    message.message_id,
                    e,
                    message.body_lossy()
                );
                return DeliveryOutcome::DeadLettered {
                    reason: e.to_string(),
                };
            }
        };

        let job = &submission.descriptor;
        let token = self.deduplicates().then(|| {
            self.policy
                .token_for(job, submission.submitted_at.or(message.sent_at))
        });
        let request = self.template.request_for(job, token);

        debug!(
            "Starting task for {} (message {}, delivery {})",
            job, message.message_id, message.receive_count
        );

        match time::timeout(self.launch_timeout, self.launcher.start_task(&request)).await {
            Ok(Ok(handle)) => {
                info!(
                    "Started task {} for {} (message {})",
                    handle.task_id, job, message.message_id
                );
                DeliveryOutcome::Acknowledged {
                    task_id: handle.task_id,
                }
            }
            Ok(Err(LaunchError::Retryable(detail))) => {
                warn!(
                    "Launch for {} failed, message {} will be retried: {}",
                    job, message.message_id, detail
                );
                DeliveryOutcome::Retry { reason: detail }
            }
            Ok(Err(LaunchError::Fatal(detail))) => {
                error!(
                    "Launch for {} rejected, dead-lettering message {}: {}",
                    job, message.message_id, detail
                );
                DeliveryOutcome::DeadLettered { reason: detail }
            }
            Err(_) => {
                warn!(
                    "Launch for {} timed out after {:?}, message {} will be retried",
                    job, self.launch_timeout, message.message_id
                );
                DeliveryOutcome::Retry {
                    reason: format!("launch timed out after {:?}", self.launch_timeout),
                }
            }
        }
    }
}
