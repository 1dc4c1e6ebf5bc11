//! Task launcher interface

use async_trait::async_trait;
use ferry_core::domain::launch::{LaunchRequest, TaskHandle};

use crate::error::LaunchError;

/// Backend able to start one containerized task per request
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Starts exactly one task
    ///
    /// # Errors
    /// [`LaunchError::Retryable`] when a later attempt may succeed,
    /// [`LaunchError::Fatal`] when it never will.
    async fn start_task(&self, request: &LaunchRequest) -> Result<TaskHandle, LaunchError>;

    /// Whether repeated requests carrying the same idempotency token start
    /// at most one task
    fn supports_deduplication(&self) -> bool;
}
