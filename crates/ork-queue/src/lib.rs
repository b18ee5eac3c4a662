//! ork-queue — the message queue seam of orkd.
//!
//! [`MessageQueue`] is the narrow interface the poll loop needs from a
//! queue: long-poll receive, per-message delete, and purge. Two
//! implementations are provided:
//!
//! - [`SqsQueue`] talks to Amazon SQS through the AWS SDK.
//! - [`MemoryQueue`] keeps messages in process; used by tests.
//!
//! Methods return boxed futures so the trait stays object-safe.

pub mod error;
pub mod memory;
pub mod sqs;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

/// SQS never returns more than ten messages per receive.
pub const MAX_BATCH: i32 = 10;

/// Longest long-poll wait SQS accepts.
pub const LONG_POLL_WAIT: Duration = Duration::from_secs(20);

/// Boxed future alias for queue operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = QueueResult<T>> + Send + 'a>>;

/// A message as received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: Option<String>,
    pub body: String,
    /// Token required to acknowledge (delete) this delivery.
    pub receipt_handle: String,
}

pub trait MessageQueue: Send + Sync {
    /// Long-poll for up to `max_messages`, blocking at most `wait`.
    fn receive(&self, max_messages: i32, wait: Duration) -> QueueFuture<'_, Vec<RawMessage>>;

    /// Acknowledge one message. Deleting an already-deleted message succeeds.
    fn delete<'a>(&'a self, message: &'a RawMessage) -> QueueFuture<'a, ()>;

    /// Drop every message currently in the queue.
    fn purge(&self) -> QueueFuture<'_, ()>;
}
