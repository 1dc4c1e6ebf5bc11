//! Error types for the Ferry backends

use thiserror::Error;

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Errors returned by a queue backend
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The backend could not be reached (network, credentials, throttling)
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (message too large, bad queue url, ...)
    #[error("queue backend rejected request: {0}")]
    Rejected(String),

    /// The call did not complete in time
    #[error("queue operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors returned by a task launcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// Capacity, throttling or transport trouble; a redelivery may succeed
    #[error("retryable launch failure: {0}")]
    Retryable(String),

    /// Bad task definition, bad network configuration, missing cluster;
    /// a redelivery will fail the same way
    #[error("fatal launch failure: {0}")]
    Fatal(String),
}

impl LaunchError {
    pub fn retryable(detail: impl Into<String>) -> Self {
        Self::Retryable(detail.into())
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::Fatal(detail.into())
    }

    /// Check if redelivering the message could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The backend's error detail
    pub fn detail(&self) -> &str {
        match self {
            Self::Retryable(detail) | Self::Fatal(detail) => detail,
        }
    }
}

/// Errors returned to callers of the producer
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("invalid job: {0}")]
    InvalidInput(String),

    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_classification() {
        let err = LaunchError::retryable("RESOURCE:CPU");
        assert!(err.is_retryable());
        assert_eq!(err.detail(), "RESOURCE:CPU");

        let err = LaunchError::fatal("task definition not found");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "fatal launch failure: task definition not found");
    }

    #[test]
    fn test_enqueue_error_wraps_queue_error() {
        let err: EnqueueError = QueueError::Unavailable("connection refused".to_string()).into();
        assert_eq!(
            err.to_string(),
            "queue backend unavailable: connection refused"
        );
    }
}
