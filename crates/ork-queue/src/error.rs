//! Error types for queue operations.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to connect to queue {queue}: {reason}")]
    Connect { queue: String, reason: String },

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("purge failed: {0}")]
    Purge(String),
}
