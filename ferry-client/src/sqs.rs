//! SQS queue backend
//!
//! Maps [`QueueBackend`] onto SQS:
//! - `send` → `SendMessage`
//! - `receive_batch` → `ReceiveMessage` with long polling
//! - `acknowledge` → `DeleteMessage`
//! - `return_to_queue` → `ChangeMessageVisibility`
//! - `dead_letter` → `SendMessage` to the dead-letter queue, then `DeleteMessage`
//!
//! Credentials and region come from the default provider chain.

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::queue::{MessageId, QueueBackend, RawMessage};

/// Message attribute carrying the dead-letter reason
pub const DEAD_LETTER_REASON_ATTRIBUTE: &str = "ferry-dead-letter-reason";

/// SQS caps a batch at 10 messages and a long poll at 20 seconds
const MAX_BATCH: usize = 10;
const MAX_WAIT_SECS: u64 = 20;

/// Queue backend talking to SQS
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    dead_letter_queue_url: Option<String>,
}

impl SqsQueue {
    /// Creates a backend for `queue_url` using an existing SDK client
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            dead_letter_queue_url: None,
        }
    }

    /// Creates a backend using the default AWS configuration chain
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), queue_url)
    }

    /// Routes dead-lettered messages to `url`.
    ///
    /// Without a dead-letter queue, dead-lettered messages are deleted once
    /// the caller has logged them.
    pub fn with_dead_letter_queue(mut self, url: impl Into<String>) -> Self {
        self.dead_letter_queue_url = Some(url.into());
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn delete(&self, message: &RawMessage) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Sorts SDK failures into transient and permanent queue errors
fn classify<E, R>(err: SdkError<E, R>) -> QueueError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(context) => match context.err().code() {
            Some(code) if code.contains("Throttl") || code.contains("OverLimit") => {
                QueueError::Unavailable(detail)
            }
            Some("InternalError") | Some("ServiceUnavailable") => QueueError::Unavailable(detail),
            _ => QueueError::Rejected(detail),
        },
        _ => QueueError::Unavailable(detail),
    }
}

/// Reads SQS's `SentTimestamp` attribute (epoch milliseconds)
fn parse_sent_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

#[async_trait]
impl QueueBackend for SqsQueue {
    async fn send(&self, body: Vec<u8>) -> QueueResult<MessageId> {
        let body = String::from_utf8(body)
            .map_err(|e| QueueError::Rejected(format!("message body is not UTF-8: {}", e)))?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(classify)?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        debug!("SQS accepted message {}", message_id);

        Ok(MessageId(message_id))
    }

    async fn receive_batch(
        &self,
        max_messages: usize,
        wait_time: Duration,
    ) -> QueueResult<Vec<RawMessage>> {
        let max_messages = max_messages.clamp(1, MAX_BATCH) as i32;
        let wait_secs = wait_time.as_secs().min(MAX_WAIT_SECS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .send()
            .await
            .map_err(classify)?;

        let mut batch = Vec::new();
        for message in output.messages() {
            let (Some(message_id), Some(receipt_handle)) =
                (message.message_id(), message.receipt_handle())
            else {
                warn!("Skipping SQS message without id or receipt handle");
                continue;
            };

            let attribute = |name: &MessageSystemAttributeName| {
                message.attributes().and_then(|attrs| attrs.get(name))
            };

            let receive_count = attribute(&MessageSystemAttributeName::ApproximateReceiveCount)
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(1);
            let sent_at = attribute(&MessageSystemAttributeName::SentTimestamp)
                .and_then(|raw| parse_sent_timestamp(raw));

            batch.push(RawMessage {
                message_id: message_id.to_string(),
                receipt_handle: receipt_handle.to_string(),
                body: message.body().unwrap_or_default().as_bytes().to_vec(),
                receive_count,
                sent_at,
            });
        }

        Ok(batch)
    }

    async fn acknowledge(&self, message: &RawMessage) -> QueueResult<()> {
        self.delete(message).await
    }

    async fn return_to_queue(&self, message: &RawMessage, delay: Duration) -> QueueResult<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .visibility_timeout(delay.as_secs().min(i32::MAX as u64) as i32)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn dead_letter(&self, message: &RawMessage, reason: &str) -> QueueResult<()> {
        let Some(dlq_url) = &self.dead_letter_queue_url else {
            warn!(
                "No dead-letter queue configured, dropping message {}",
                message.message_id
            );
            return self.delete(message).await;
        };

        let reason_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(reason)
            .build()
            .map_err(|e| QueueError::Rejected(e.to_string()))?;

        // Forward first: if the delete then fails the message is redelivered
        // and forwarded again, which is safe
        self.client
            .send_message()
            .queue_url(dlq_url)
            .message_body(message.body_lossy().into_owned())
            .message_attributes(DEAD_LETTER_REASON_ATTRIBUTE, reason_attribute)
            .send()
            .await
            .map_err(classify)?;

        self.delete(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sent_timestamp() {
        let at = parse_sent_timestamp("1772359200000").unwrap();
        assert_eq!(at.timestamp(), 1_772_359_200);
        assert!(parse_sent_timestamp("yesterday").is_none());
    }
}
