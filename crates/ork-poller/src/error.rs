//! Poll loop error types.

use thiserror::Error;

/// Errors that stop the service before or while entering the loop.
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("could not connect to queue {queue} in {region}")]
    Connect { region: String, queue: String },

    #[error("queue error: {0}")]
    Queue(#[from] ork_queue::QueueError),
}

pub type PollerResult<T> = Result<T, PollerError>;
