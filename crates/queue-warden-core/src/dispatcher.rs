//! Dead-letter dispatch.
//!
//! Copies a message to a dead-letter queue. The original is left in its
//! source queue; removing it is the caller's decision.

use crate::error::LifecycleError;
use queue_warden_runtime::{MessageId, QueueName, QueueTransport, ReceivedMessage};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

/// Sends copies of messages to dead-letter queues
#[derive(Clone)]
pub struct DeadLetterDispatcher {
    transport: Arc<dyn QueueTransport>,
}

impl DeadLetterDispatcher {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    /// Send the body and attributes of `message` to `dead_letter_queue`
    ///
    /// The queue URL is resolved on every call so a recreated queue is picked up.
    pub async fn send_to_dlq(
        &self,
        dead_letter_queue: &QueueName,
        message: &ReceivedMessage,
    ) -> Result<MessageId, LifecycleError> {
        let dispatch_error = |source| LifecycleError::DlqDispatch {
            dead_letter_queue: dead_letter_queue.to_string(),
            message_id: message.message_id.to_string(),
            source,
        };

        let url = self
            .transport
            .resolve_url(dead_letter_queue)
            .await
            .map_err(dispatch_error)?;

        match self.transport.send_message(&url, &message.to_outgoing()).await {
            Ok(dlq_message_id) => {
                debug!(
                    message_id = %message.message_id,
                    dlq_message_id = %dlq_message_id,
                    dead_letter_queue = %dead_letter_queue,
                    "Sent message copy to dead-letter queue"
                );
                Ok(dlq_message_id)
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    dead_letter_queue = %dead_letter_queue,
                    error = %e,
                    "Failed to send message copy to dead-letter queue"
                );
                Err(dispatch_error(e))
            }
        }
    }
}
