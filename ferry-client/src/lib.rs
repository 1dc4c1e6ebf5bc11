//! Ferry backend clients
//!
//! The narrow interfaces Ferry needs from the outside world, and their
//! implementations:
//!
//! - [`QueueBackend`]: durable at-least-once queue ([`SqsQueue`], [`InMemoryQueue`])
//! - [`TaskLauncher`]: starts one container task per request ([`EcsLauncher`], [`InMemoryLauncher`])
//! - [`JobProducer`]: publishes job descriptors to a queue
//!
//! Clients are constructed once at startup and shared behind `Arc`; nothing
//! in this crate holds global state.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::{JobProducer, SqsQueue};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = SqsQueue::from_env("https://sqs.eu-west-1.amazonaws.com/123456789012/jobs").await;
//!     let producer = JobProducer::new(Arc::new(queue));
//!
//!     let handle = producer.enqueue("my-bucket", "sample.pdf").await?;
//!     println!("Enqueued message {}", handle.message_id);
//!     Ok(())
//! }
//! ```

pub mod ecs;
pub mod error;
mod launcher;
pub mod memory;
mod producer;
mod queue;
pub mod sqs;

// Re-export commonly used types
pub use ecs::EcsLauncher;
pub use error::{EnqueueError, LaunchError, QueueError, QueueResult};
pub use launcher::TaskLauncher;
pub use memory::{InMemoryLauncher, InMemoryQueue};
pub use producer::{DeliveryHandle, JobProducer};
pub use queue::{MessageId, QueueBackend, RawMessage};
pub use sqs::SqsQueue;
