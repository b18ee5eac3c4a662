//! In-process [`MessageQueue`].
//!
//! Received messages stay visible until deleted, so an un-deleted message
//! is redelivered on the next receive, like SQS after its visibility
//! timeout expires.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{MessageQueue, QueueError, QueueFuture, RawMessage};

#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<RawMessage>,
    /// Receipt handles of every successful delete, in order.
    deleted: Vec<String>,
    next_id: u64,
    receive_calls: usize,
    fail_receive: bool,
    fail_delete: bool,
    purged: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body and return its receipt handle.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let receipt_handle = format!("receipt-{id}");
        inner.messages.push(RawMessage {
            message_id: Some(format!("msg-{id}")),
            body: body.into(),
            receipt_handle: receipt_handle.clone(),
        });
        receipt_handle
    }

    /// Number of messages still in the queue.
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, receipt_handle: &str) -> bool {
        self.lock()
            .messages
            .iter()
            .any(|m| m.receipt_handle == receipt_handle)
    }

    /// Receipt handles passed to successful deletes.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Number of receive calls, failed ones included.
    pub fn receive_calls(&self) -> usize {
        self.lock().receive_calls
    }

    pub fn was_purged(&self) -> bool {
        self.lock().purged
    }

    /// Make subsequent receives fail.
    pub fn set_fail_receive(&self, fail: bool) {
        self.lock().fail_receive = fail;
    }

    /// Make subsequent deletes fail.
    pub fn set_fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageQueue for MemoryQueue {
    fn receive(&self, max_messages: i32, _wait: Duration) -> QueueFuture<'_, Vec<RawMessage>> {
        let result = {
            let mut inner = self.lock();
            inner.receive_calls += 1;
            if inner.fail_receive {
                Err(QueueError::Receive("receive disabled".to_string()))
            } else {
                let max = usize::try_from(max_messages).unwrap_or(0);
                Ok(inner.messages.iter().take(max).cloned().collect())
            }
        };
        Box::pin(async move { result })
    }

    fn delete<'a>(&'a self, message: &'a RawMessage) -> QueueFuture<'a, ()> {
        let result = {
            let mut inner = self.lock();
            if inner.fail_delete {
                Err(QueueError::Delete("delete disabled".to_string()))
            } else {
                inner
                    .messages
                    .retain(|m| m.receipt_handle != message.receipt_handle);
                inner.deleted.push(message.receipt_handle.clone());
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn purge(&self) -> QueueFuture<'_, ()> {
        {
            let mut inner = self.lock();
            inner.messages.clear();
            inner.purged = true;
        }
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(0);

    #[tokio::test]
    async fn receive_respects_batch_size() {
        let queue = MemoryQueue::new();
        for i in 0..12 {
            queue.push(format!("body-{i}"));
        }

        let batch = queue.receive(crate::MAX_BATCH, WAIT).await.unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].body, "body-0");
    }

    #[tokio::test]
    async fn undeleted_messages_are_redelivered() {
        let queue = MemoryQueue::new();
        queue.push("a");

        let first = queue.receive(10, WAIT).await.unwrap();
        let second = queue.receive(10, WAIT).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let queue = MemoryQueue::new();
        let receipt = queue.push("a");
        let message = queue.receive(10, WAIT).await.unwrap().remove(0);

        queue.delete(&message).await.unwrap();
        queue.delete(&message).await.unwrap();

        assert!(queue.is_empty());
        assert!(!queue.contains(&receipt));
        assert_eq!(queue.deleted(), vec![receipt.clone(), receipt]);
    }

    #[tokio::test]
    async fn purge_clears_everything() {
        let queue = MemoryQueue::new();
        queue.push("a");
        queue.push("b");

        queue.purge().await.unwrap();
        assert!(queue.is_empty());
        assert!(queue.was_purged());
        assert!(queue.deleted().is_empty());
    }

    #[tokio::test]
    async fn injected_failures() {
        let queue = MemoryQueue::new();
        queue.push("a");
        let message = queue.receive(10, WAIT).await.unwrap().remove(0);

        queue.set_fail_delete(true);
        assert!(matches!(
            queue.delete(&message).await,
            Err(QueueError::Delete(_))
        ));
        assert_eq!(queue.len(), 1);

        queue.set_fail_receive(true);
        assert!(matches!(
            queue.receive(10, WAIT).await,
            Err(QueueError::Receive(_))
        ));
        assert_eq!(queue.receive_calls(), 2);
    }
}
