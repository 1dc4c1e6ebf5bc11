//! In-memory backends for tests and local development.
//!
//! [`InMemoryQueue`] and [`InMemoryLauncher`] implement the backend traits
//! with process-local state.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no persistence, no distribution
//! - **No visibility timeout**: an in-flight message stays in flight until it
//!   is acknowledged, returned or dead-lettered
//! - **No delay support**: the return-to-queue delay is recorded but the
//!   message is visible again immediately

use async_trait::async_trait;
use chrono::Utc;
use ferry_core::domain::launch::{LaunchRequest, TaskHandle};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{LaunchError, QueueError, QueueResult};
use crate::launcher::TaskLauncher;
use crate::queue::{MessageId, QueueBackend, RawMessage};

/// Locks a mutex, recovering the data if another holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message that was routed to the dead-letter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: Vec<u8>,
    pub reason: String,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<RawMessage>,
    in_flight: HashMap<String, RawMessage>,
    acknowledged: Vec<String>,
    dead_letters: Vec<DeadLetter>,
    return_delays: Vec<Duration>,
    send_failures: VecDeque<QueueError>,
    receive_failures: VecDeque<QueueError>,
}

/// In-memory at-least-once queue
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    arrivals: Notify,
    /// Redrive threshold: a message received more often than this is
    /// dead-lettered instead of delivered
    max_receive_count: Option<u32>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that dead-letters messages after `max_receive_count` deliveries
    pub fn with_max_receive_count(max_receive_count: u32) -> Self {
        Self {
            max_receive_count: Some(max_receive_count),
            ..Self::default()
        }
    }

    /// Pushes a raw body, bypassing any encoding; returns the message id
    pub fn push_raw(&self, body: impl Into<Vec<u8>>) -> String {
        let message_id = Uuid::new_v4().to_string();
        lock(&self.state).visible.push_back(RawMessage {
            message_id: message_id.clone(),
            receipt_handle: String::new(),
            body: body.into(),
            receive_count: 0,
            sent_at: Some(Utc::now()),
        });
        self.arrivals.notify_one();
        message_id
    }

    /// Makes the next `send` fail with `error`
    pub fn fail_next_send(&self, error: QueueError) {
        lock(&self.state).send_failures.push_back(error);
    }

    /// Makes the next `receive_batch` fail with `error`
    pub fn fail_next_receive(&self, error: QueueError) {
        lock(&self.state).receive_failures.push_back(error);
    }

    /// Number of messages waiting to be received
    pub fn visible_len(&self) -> usize {
        lock(&self.state).visible.len()
    }

    /// Number of received messages not yet settled
    pub fn in_flight_len(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// Ids of acknowledged messages, in acknowledgement order
    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.state).acknowledged.clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.state).dead_letters.clone()
    }

    /// Delays passed to `return_to_queue`, in call order
    pub fn return_delays(&self) -> Vec<Duration> {
        lock(&self.state).return_delays.clone()
    }

    /// Takes up to `max` visible messages and marks them in flight
    fn take_visible(&self, max: usize) -> Vec<RawMessage> {
        let mut state = lock(&self.state);
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(mut message) = state.visible.pop_front() else {
                break;
            };
            message.receive_count += 1;

            if let Some(limit) = self.max_receive_count {
                if message.receive_count > limit {
                    state.dead_letters.push(DeadLetter {
                        message_id: message.message_id,
                        body: message.body,
                        reason: format!("exceeded max receive count {}", limit),
                    });
                    continue;
                }
            }

            message.receipt_handle = Uuid::new_v4().to_string();
            state
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
            batch.push(message);
        }

        batch
    }
}

/// Removes an in-flight delivery, failing for unknown or stale receipts
fn settle(state: &mut QueueState, message: &RawMessage) -> QueueResult<RawMessage> {
    state
        .in_flight
        .remove(&message.receipt_handle)
        .ok_or_else(|| {
            QueueError::Rejected(format!(
                "receipt handle {} is not in flight",
                message.receipt_handle
            ))
        })
}

#[async_trait]
impl QueueBackend for InMemoryQueue {
    async fn send(&self, body: Vec<u8>) -> QueueResult<MessageId> {
        if let Some(error) = lock(&self.state).send_failures.pop_front() {
            return Err(error);
        }
        Ok(MessageId(self.push_raw(body)))
    }

    async fn receive_batch(
        &self,
        max_messages: usize,
        wait_time: Duration,
    ) -> QueueResult<Vec<RawMessage>> {
        if let Some(error) = lock(&self.state).receive_failures.pop_front() {
            return Err(error);
        }

        let batch = self.take_visible(max_messages);
        if !batch.is_empty() || wait_time.is_zero() {
            return Ok(batch);
        }

        // Long poll: wait for one arrival, then take whatever is there
        let _ = tokio::time::timeout(wait_time, self.arrivals.notified()).await;
        Ok(self.take_visible(max_messages))
    }

    async fn acknowledge(&self, message: &RawMessage) -> QueueResult<()> {
        let mut state = lock(&self.state);
        let settled = settle(&mut state, message)?;
        state.acknowledged.push(settled.message_id);
        Ok(())
    }

    async fn return_to_queue(&self, message: &RawMessage, delay: Duration) -> QueueResult<()> {
        let mut state = lock(&self.state);
        let mut settled = settle(&mut state, message)?;
        state.return_delays.push(delay);
        settled.receipt_handle.clear();
        state.visible.push_back(settled);
        drop(state);
        self.arrivals.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, message: &RawMessage, reason: &str) -> QueueResult<()> {
        let mut state = lock(&self.state);
        let settled = settle(&mut state, message)?;
        state.dead_letters.push(DeadLetter {
            message_id: settled.message_id,
            body: settled.body,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    scripted: VecDeque<Result<(), LaunchError>>,
    calls: Vec<LaunchRequest>,
    started: Vec<TaskHandle>,
    by_token: HashMap<String, TaskHandle>,
}

/// In-memory task launcher with scripted responses
///
/// Accepts every request unless a response was scripted with
/// [`InMemoryLauncher::push_response`]. With deduplication enabled, requests
/// repeating an idempotency token return the task started the first time.
#[derive(Debug, Default)]
pub struct InMemoryLauncher {
    state: Mutex<LauncherState>,
    deduplicates: bool,
    latency: Option<Duration>,
}

impl InMemoryLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a launcher that collapses requests sharing an idempotency token
    pub fn deduplicating() -> Self {
        Self {
            deduplicates: true,
            ..Self::default()
        }
    }

    /// Makes every call take `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues the response for a future call; `Ok(())` accepts
    pub fn push_response(&self, response: Result<(), LaunchError>) {
        lock(&self.state).scripted.push_back(response);
    }

    /// Every request received, in call order
    pub fn calls(&self) -> Vec<LaunchRequest> {
        lock(&self.state).calls.clone()
    }

    /// Distinct tasks actually started
    pub fn started(&self) -> Vec<TaskHandle> {
        lock(&self.state).started.clone()
    }
}

#[async_trait]
impl TaskLauncher for InMemoryLauncher {
    async fn start_task(&self, request: &LaunchRequest) -> Result<TaskHandle, LaunchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = lock(&self.state);
        state.calls.push(request.clone());

        if let Some(Err(error)) = state.scripted.pop_front() {
            return Err(error);
        }

        let token = request
            .idempotency_token
            .as_ref()
            .filter(|_| self.deduplicates)
            .map(|token| token.as_str().to_string());

        if let Some(existing) = token.as_ref().and_then(|t| state.by_token.get(t)) {
            return Ok(existing.clone());
        }

        let handle = TaskHandle {
            task_id: format!("task/{}/{}", request.cluster, Uuid::new_v4()),
        };
        state.started.push(handle.clone());
        if let Some(token) = token {
            state.by_token.insert(token, handle.clone());
        }

        Ok(handle)
    }

    fn supports_deduplication(&self) -> bool {
        self.deduplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::idempotency::IdempotencyPolicy;
    use ferry_core::domain::job::JobDescriptor;
    use ferry_core::domain::launch::{AssignPublicIp, LaunchTemplate, LaunchType, NetworkPlacement};

    fn request(token: bool) -> LaunchRequest {
        let job = JobDescriptor::new("my-bucket", "sample.pdf").unwrap();
        let template = LaunchTemplate {
            cluster: "ocr-cluster".to_string(),
            task_definition: "ocr-task".to_string(),
            launch_type: LaunchType::Fargate,
            network: NetworkPlacement {
                subnets: vec!["subnet-a".to_string()],
                security_groups: vec!["sg-1".to_string()],
                assign_public_ip: AssignPublicIp::Enabled,
            },
            container_name: None,
        };
        let token = token.then(|| IdempotencyPolicy::default().token_for(&job, None));
        template.request_for(&job, token)
    }

    #[tokio::test]
    async fn test_queue_ack_and_return() {
        let queue = InMemoryQueue::new();
        queue.push_raw("a");
        queue.push_raw("b");

        let batch = queue.receive_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.in_flight_len(), 2);

        queue.acknowledge(&batch[0]).await.unwrap();
        queue
            .return_to_queue(&batch[1], Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(queue.acknowledged(), vec![batch[0].message_id.clone()]);
        assert_eq!(queue.visible_len(), 1);

        let again = queue.receive_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(again[0].message_id, batch[1].message_id);
        assert_eq!(again[0].receive_count, 2);
        assert_ne!(again[0].receipt_handle, batch[1].receipt_handle);
    }

    #[tokio::test]
    async fn test_queue_rejects_stale_receipt() {
        let queue = InMemoryQueue::new();
        queue.push_raw("a");

        let batch = queue.receive_batch(1, Duration::ZERO).await.unwrap();
        queue.acknowledge(&batch[0]).await.unwrap();
        assert!(matches!(
            queue.acknowledge(&batch[0]).await,
            Err(QueueError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_redrive_after_max_receives() {
        let queue = InMemoryQueue::with_max_receive_count(1);
        queue.push_raw("poison");

        let batch = queue.receive_batch(1, Duration::ZERO).await.unwrap();
        queue
            .return_to_queue(&batch[0], Duration::ZERO)
            .await
            .unwrap();

        let batch = queue.receive_batch(1, Duration::ZERO).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_long_poll_wakes_on_send() {
        let queue = std::sync::Arc::new(InMemoryQueue::new());
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive_batch(10, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.send(b"late".to_vec()).await.unwrap();

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, b"late");
    }

    #[tokio::test]
    async fn test_launcher_scripted_responses() {
        let launcher = InMemoryLauncher::new();
        launcher.push_response(Err(LaunchError::retryable("RESOURCE:CPU")));

        let err = launcher.start_task(&request(false)).await.unwrap_err();
        assert!(err.is_retryable());

        launcher.start_task(&request(false)).await.unwrap();
        assert_eq!(launcher.calls().len(), 2);
        assert_eq!(launcher.started().len(), 1);
    }

    #[tokio::test]
    async fn test_launcher_dedup_by_token() {
        let launcher = InMemoryLauncher::deduplicating();

        let first = launcher.start_task(&request(true)).await.unwrap();
        let second = launcher.start_task(&request(true)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(launcher.calls().len(), 2);
        assert_eq!(launcher.started().len(), 1);
    }

    #[tokio::test]
    async fn test_launcher_without_dedup_starts_duplicates() {
        let launcher = InMemoryLauncher::new();

        launcher.start_task(&request(true)).await.unwrap();
        launcher.start_task(&request(true)).await.unwrap();

        assert!(!launcher.supports_deduplication());
        assert_eq!(launcher.started().len(), 2);
    }
}
