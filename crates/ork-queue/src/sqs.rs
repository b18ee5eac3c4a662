//! Amazon SQS implementation of [`MessageQueue`].

use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tracing::{debug, error, info, warn};

use crate::{MessageQueue, QueueError, QueueFuture, QueueResult, RawMessage};

/// Handle to one named SQS queue in one region.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_name: String,
    queue_url: String,
}

impl SqsQueue {
    /// Resolve `queue_name` in `region`.
    ///
    /// Returns `None` when the queue cannot be reached (credentials,
    /// unknown queue, network). The error is logged here; callers treat
    /// `None` as fatal.
    pub async fn connect(region: &str, queue_name: &str) -> Option<Self> {
        match Self::try_connect(region, queue_name).await {
            Ok(queue) => Some(queue),
            Err(e) => {
                error!(region, queue = queue_name, error = %e, "error connecting to SQS");
                None
            }
        }
    }

    /// Like [`SqsQueue::connect`], but hands the error back.
    pub async fn try_connect(region: &str, queue_name: &str) -> QueueResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let client = Client::new(&config);

        let output = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| QueueError::Connect {
                queue: queue_name.to_string(),
                reason: describe_sdk_error(&e),
            })?;

        let queue_url = output
            .queue_url()
            .ok_or_else(|| QueueError::Connect {
                queue: queue_name.to_string(),
                reason: "no queue url in response".to_string(),
            })?
            .to_string();

        info!(queue = queue_name, url = %queue_url, "resolved SQS queue");

        Ok(Self {
            client,
            queue_name: queue_name.to_string(),
            queue_url,
        })
    }
}

impl MessageQueue for SqsQueue {
    fn receive(&self, max_messages: i32, wait: Duration) -> QueueFuture<'_, Vec<RawMessage>> {
        Box::pin(async move {
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(max_messages.clamp(1, crate::MAX_BATCH))
                .wait_time_seconds(wait.as_secs().min(20) as i32)
                .send()
                .await
                .map_err(|e| QueueError::Receive(describe_sdk_error(&e)))?;

            let mut received = Vec::new();
            for message in output.messages.unwrap_or_default() {
                let Some(receipt_handle) = message.receipt_handle else {
                    warn!(
                        message_id = message.message_id.as_deref().unwrap_or("unknown"),
                        "message without receipt handle, skipping"
                    );
                    continue;
                };
                received.push(RawMessage {
                    message_id: message.message_id,
                    body: message.body.unwrap_or_default(),
                    receipt_handle,
                });
            }

            debug!(queue = %self.queue_name, count = received.len(), "received messages");
            Ok(received)
        })
    }

    fn delete<'a>(&'a self, message: &'a RawMessage) -> QueueFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(&message.receipt_handle)
                .send()
                .await
                .map_err(|e| QueueError::Delete(describe_sdk_error(&e)))?;
            Ok(())
        })
    }

    fn purge(&self) -> QueueFuture<'_, ()> {
        Box::pin(async move {
            self.client
                .purge_queue()
                .queue_url(&self.queue_url)
                .send()
                .await
                .map_err(|e| QueueError::Purge(describe_sdk_error(&e)))?;
            Ok(())
        })
    }
}

/// Render an SDK error with its service code when there is one.
fn describe_sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(ctx) => format!(
            "{}: {}",
            ctx.err().code().unwrap_or("unknown"),
            ctx.err().message().unwrap_or("n/a")
        ),
        other => DisplayErrorContext(other).to_string(),
    }
}
