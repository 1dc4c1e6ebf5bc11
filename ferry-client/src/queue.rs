//! Queue backend interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::QueueResult;

/// Identifier the backend assigned to a sent message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as handed out by [`QueueBackend::receive_batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Stable across redeliveries
    pub message_id: String,

    /// Token for this particular delivery; used to ack or release it
    pub receipt_handle: String,

    pub body: Vec<u8>,

    /// How many times the backend has delivered this message, this delivery included
    pub receive_count: u32,

    /// When the message was first sent, if the backend reports it
    pub sent_at: Option<DateTime<Utc>>,
}

impl RawMessage {
    /// Body as text for logging; invalid UTF-8 is replaced
    pub fn body_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Durable at-least-once queue
///
/// Implementations are shared by every worker, so all methods take `&self`.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Publishes one message
    async fn send(&self, body: Vec<u8>) -> QueueResult<MessageId>;

    /// Receives up to `max_messages`, waiting at most `wait_time` for the first one
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait_time: Duration,
    ) -> QueueResult<Vec<RawMessage>>;

    /// Removes a processed message from the queue
    async fn acknowledge(&self, message: &RawMessage) -> QueueResult<()>;

    /// Makes the message visible again after `delay` so it is redelivered
    async fn return_to_queue(&self, message: &RawMessage, delay: Duration) -> QueueResult<()>;

    /// Routes a message that can never succeed away from the main queue
    async fn dead_letter(&self, message: &RawMessage, reason: &str) -> QueueResult<()>;
}
