//! Event dispatcher — maps one parsed message to a key action.
//!
//! | kind      | action          | deleted when                        |
//! |-----------|-----------------|-------------------------------------|
//! | Terminate | delete key      | the key delete succeeded            |
//! | Launch    | accept key      | a pending key was accepted          |
//! | Test      | none            | always                              |
//! | Unknown   | none            | `DeleteUnknownMessages` is true     |
//!
//! A launch notification usually arrives before the minion has
//! submitted its key. Leaving the message in the queue turns SQS
//! redelivery into the retry loop for that case.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use ork_core::{EventKind, ParsedEvent};
use ork_keys::KeyStore;
use ork_queue::{MessageQueue, RawMessage};

/// What handling one message did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// The message was removed from the queue.
    pub deleted: bool,
    /// A key was accepted or deleted.
    pub mutated: bool,
}

impl Outcome {
    const RETAINED: Outcome = Outcome {
        deleted: false,
        mutated: false,
    };
}

pub struct Dispatcher {
    keys: Arc<dyn KeyStore>,
    delete_unknown: bool,
}

impl Dispatcher {
    pub fn new(keys: Arc<dyn KeyStore>, delete_unknown: bool) -> Self {
        Self {
            keys,
            delete_unknown,
        }
    }

    /// Handle one message and report what happened to it.
    pub async fn dispatch(
        &self,
        queue: &dyn MessageQueue,
        event: &ParsedEvent,
        message: &RawMessage,
    ) -> Outcome {
        match (event.kind, event.instance_id.as_deref()) {
            (EventKind::Terminate, Some(id)) => self.on_terminate(queue, id, message).await,
            (EventKind::Launch, Some(id)) => self.on_launch(queue, id, message).await,
            (EventKind::Test, _) => Outcome {
                deleted: delete_message(queue, message).await,
                mutated: false,
            },
            (EventKind::Launch | EventKind::Terminate, None) => {
                warn!(
                    event = event.kind.label(),
                    message_id = message_id(message),
                    "lifecycle event without instance id"
                );
                self.on_unknown(queue, message).await
            }
            (EventKind::Unknown, _) => self.on_unknown(queue, message).await,
        }
    }

    async fn on_terminate(
        &self,
        queue: &dyn MessageQueue,
        id: &str,
        message: &RawMessage,
    ) -> Outcome {
        match self.keys.delete(id) {
            Ok(states) => {
                info!(instance = id, states = ?states, "deleted key");
                Outcome {
                    deleted: delete_message(queue, message).await,
                    mutated: true,
                }
            }
            Err(e) => {
                error!(instance = id, error = %e, "error removing salt key");
                Outcome::RETAINED
            }
        }
    }

    async fn on_launch(
        &self,
        queue: &dyn MessageQueue,
        id: &str,
        message: &RawMessage,
    ) -> Outcome {
        match self.keys.accept(id) {
            Ok(accepted) if !accepted.is_empty() => {
                info!(minions = %accepted.minions.join(","), "accepted key");
                Outcome {
                    deleted: delete_message(queue, message).await,
                    mutated: true,
                }
            }
            Ok(_) => {
                debug!(instance = id, "no pending key yet, retrying later");
                Outcome::RETAINED
            }
            Err(e) => {
                error!(instance = id, error = %e, "error accepting salt key");
                Outcome::RETAINED
            }
        }
    }

    async fn on_unknown(&self, queue: &dyn MessageQueue, message: &RawMessage) -> Outcome {
        if !self.delete_unknown {
            debug!(message_id = message_id(message), "leaving unknown message");
            return Outcome::RETAINED;
        }
        Outcome {
            deleted: delete_message(queue, message).await,
            mutated: false,
        }
    }
}

/// Acknowledge a message; a failure leaves it for redelivery.
async fn delete_message(queue: &dyn MessageQueue, message: &RawMessage) -> bool {
    debug!(message_id = message_id(message), "deleting message");
    match queue.delete(message).await {
        Ok(()) => true,
        Err(e) => {
            error!(message_id = message_id(message), error = %e, "failed to delete message");
            false
        }
    }
}

fn message_id(message: &RawMessage) -> &str {
    message.message_id.as_deref().unwrap_or("unknown")
}
