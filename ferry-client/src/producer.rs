//! Job producer
//!
//! Publishes job descriptors to the queue. The producer neither retries nor
//! deduplicates; both are left to the caller and the dispatcher.

use chrono::Utc;
use ferry_core::domain::job::JobDescriptor;
use ferry_core::dto::job::encode_job;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::EnqueueError;
use crate::queue::{MessageId, QueueBackend};

/// Returned once a job message is visible in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub message_id: MessageId,
}

/// Enqueues jobs through an injected queue backend
#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn QueueBackend>,
}

impl JobProducer {
    pub fn new(queue: Arc<dyn QueueBackend>) -> Self {
        Self { queue }
    }

    /// Enqueues one job
    ///
    /// # Arguments
    /// * `source_location` - Storage container (bucket) holding the object
    /// * `object_key` - Key of the object to process
    ///
    /// # Errors
    /// [`EnqueueError::InvalidInput`] for empty arguments, otherwise whatever
    /// the queue backend reports.
    pub async fn enqueue(
        &self,
        source_location: &str,
        object_key: &str,
    ) -> Result<DeliveryHandle, EnqueueError> {
        let job = JobDescriptor::new(source_location, object_key)
            .map_err(|e| EnqueueError::InvalidInput(e.to_string()))?;

        let body = encode_job(&job, Some(Utc::now()))?;
        debug!("Encoded job {} ({} bytes)", job, body.len());

        let message_id = self.queue.send(body).await?;
        info!("Enqueued job {} as message {}", job, message_id);

        Ok(DeliveryHandle { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::memory::InMemoryQueue;
    use ferry_core::dto::job::{DecodeOptions, decode_job};
    use std::time::Duration;

    #[tokio::test]
    async fn test_enqueue_then_receive() {
        let queue = Arc::new(InMemoryQueue::new());
        let producer = JobProducer::new(queue.clone());

        let handle = producer.enqueue("my-bucket", "sample.pdf").await.unwrap();

        let batch = queue.receive_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message_id, handle.message_id.0);

        let submission = decode_job(&batch[0].body, DecodeOptions::default()).unwrap();
        assert_eq!(
            submission.descriptor,
            JobDescriptor::new("my-bucket", "sample.pdf").unwrap()
        );
        assert!(submission.submitted_at.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_input() {
        let queue = Arc::new(InMemoryQueue::new());
        let producer = JobProducer::new(queue.clone());

        let err = producer.enqueue("", "sample.pdf").await.unwrap_err();
        assert!(matches!(err, EnqueueError::InvalidInput(_)));

        let err = producer.enqueue("my-bucket", "").await.unwrap_err();
        assert!(matches!(err, EnqueueError::InvalidInput(_)));

        assert_eq!(queue.visible_len(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_surfaces_backend_failure() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.fail_next_send(QueueError::Unavailable("connection refused".to_string()));
        let producer = JobProducer::new(queue.clone());

        let err = producer.enqueue("my-bucket", "sample.pdf").await.unwrap_err();
        assert!(matches!(err, EnqueueError::Queue(QueueError::Unavailable(_))));
        assert_eq!(queue.visible_len(), 0);
    }
}
