//! Message lifecycle controller.
//!
//! Every operation validates its queue names through the [`QueueDirectory`],
//! receives one batch (or loops over batches for [`LifecycleController::poll_forever`])
//! and records an independent outcome per message. A failed delete or
//! visibility change never stops the remaining messages of the batch from
//! being attempted; a failed dead-letter send does.
//!
//! Nothing here retries a remote call. Redelivery happens through the queue
//! service's visibility windows.

use crate::directory::QueueDirectory;
use crate::dispatcher::DeadLetterDispatcher;
use crate::error::LifecycleError;
use crate::processor::{AcceptAll, MessageProcessor};
use crate::report::{BatchReport, DrainOutcome, LifecycleStep, MessageOutcome, PollSummary};
use crate::settings::LifecycleSettings;
use queue_warden_runtime::{
    MessageId, OutgoingMessage, QueueName, QueueTransport, QueueUrl, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;

/// Drives received messages to deletion or the dead-letter queue
///
/// # Example
///
/// ```
/// use queue_warden_core::{DrainOutcome, LifecycleController, QueueDirectory};
/// use queue_warden_runtime::{QueueName, TransportFactory};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let directory = Arc::new(QueueDirectory::new());
/// directory.register(QueueName::new("orders".to_string()).unwrap());
///
/// let controller = LifecycleController::new(TransportFactory::create_test_transport(), directory);
/// controller.send_message("orders", "hello", HashMap::new()).await.unwrap();
///
/// match controller.drain("orders").await.unwrap() {
///     DrainOutcome::Drained(report) => assert_eq!(report.deleted(), 1),
///     DrainOutcome::InvalidQueue { .. } => unreachable!(),
/// }
/// # });
/// ```
#[derive(Clone)]
pub struct LifecycleController {
    transport: Arc<dyn QueueTransport>,
    directory: Arc<QueueDirectory>,
    dispatcher: DeadLetterDispatcher,
    processor: Arc<dyn MessageProcessor>,
    settings: LifecycleSettings,
}

impl LifecycleController {
    /// Create a controller that accepts every message
    pub fn new(transport: Arc<dyn QueueTransport>, directory: Arc<QueueDirectory>) -> Self {
        Self {
            dispatcher: DeadLetterDispatcher::new(transport.clone()),
            transport,
            directory,
            processor: Arc::new(AcceptAll),
            settings: LifecycleSettings::default(),
        }
    }

    /// Use a different processing step
    pub fn with_processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn directory(&self) -> &Arc<QueueDirectory> {
        &self.directory
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    // ========================================================================
    // Directory and queue operations
    // ========================================================================

    /// Reload the directory from the transport's queue list
    pub async fn refresh_directory(&self) -> Result<Vec<QueueName>, LifecycleError> {
        self.directory.refresh(self.transport.as_ref()).await
    }

    /// Refresh the directory and return every known queue name
    pub async fn list_queues(&self) -> Result<Vec<QueueName>, LifecycleError> {
        self.refresh_directory().await?;
        Ok(self.directory.known_names())
    }

    /// Resolve a known queue's URL
    pub async fn queue_url(&self, queue: &str) -> Result<QueueUrl, LifecycleError> {
        let queue = self.directory.validate(queue)?;
        Ok(self.transport.resolve_url(&queue).await?)
    }

    /// Send a message to a known queue
    #[instrument(skip(self, body, attributes), fields(queue = %queue))]
    pub async fn send_message(
        &self,
        queue: &str,
        body: impl Into<String> + Send,
        attributes: HashMap<String, String>,
    ) -> Result<MessageId, LifecycleError> {
        let url = self.queue_url(queue).await?;
        let message = OutgoingMessage::new(body).with_attributes(attributes);
        let message_id = self.transport.send_message(&url, &message).await?;

        debug!(message_id = %message_id, "Sent message");
        Ok(message_id)
    }

    /// Approximate number of visible messages in a known queue
    pub async fn approximate_message_count(&self, queue: &str) -> Result<u64, LifecycleError> {
        let url = self.queue_url(queue).await?;
        Ok(self.transport.approximate_message_count(&url).await?)
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Receive one batch and delete every message as read
    ///
    /// Each message first gets the configured drain extension, then is deleted
    /// whatever its content. An unknown queue is reported as
    /// [`DrainOutcome::InvalidQueue`] rather than an error.
    #[instrument(skip(self), fields(queue = %queue))]
    pub async fn receive_once(
        &self,
        queue: &str,
        batch_size: u32,
        visibility_timeout_seconds: u32,
    ) -> Result<DrainOutcome, LifecycleError> {
        let Ok(queue_name) = self.directory.validate(queue) else {
            warn!("Refusing to drain unknown queue");
            return Ok(DrainOutcome::InvalidQueue {
                queue: queue.to_string(),
            });
        };

        let request = ReceiveRequest::new(batch_size)
            .map_err(configuration_error)?
            .with_visibility_timeout(
                VisibilityTimeout::new(visibility_timeout_seconds).map_err(configuration_error)?,
            );
        let extension = self.settings.drain.extension()?;

        let url = self.transport.resolve_url(&queue_name).await?;
        let messages = self.transport.receive_messages(&url, &request).await?;

        let mut report = BatchReport::new(queue_name, None);
        for message in &messages {
            self.extend(&url, message, extension).await;
            let outcome = self.delete(&url, message).await;
            report.push(message, outcome);
        }

        info!(
            received = report.received(),
            deleted = report.deleted(),
            "Drained batch"
        );
        Ok(DrainOutcome::Drained(report))
    }

    /// [`receive_once`](Self::receive_once) with the configured drain batch and window
    pub async fn drain(&self, queue: &str) -> Result<DrainOutcome, LifecycleError> {
        let drain = &self.settings.drain;
        self.receive_once(queue, drain.batch_size, drain.visibility_timeout_seconds)
            .await
    }

    /// Long-poll a queue until `cancel` fires
    ///
    /// Each message gets the poll extension, is processed, and is deleted on
    /// success. Failures go to the configured dead-letter queue, or are left
    /// for redelivery when none is configured. Cancellation stops the next
    /// receive and abandons a receive that is still waiting; a batch already
    /// received is handled to completion.
    #[instrument(skip(self, cancel), fields(queue = %queue))]
    pub async fn poll_forever(
        &self,
        queue: &str,
        cancel: CancellationToken,
    ) -> Result<PollSummary, LifecycleError> {
        let queue_name = self.directory.validate(queue)?;
        let dead_letter_queue = self.settings.poll.dead_letter_queue()?;
        if let Some(dlq) = &dead_letter_queue {
            self.directory.validate(dlq.as_str())?;
        }

        let request = self.settings.poll.receive_request()?;
        let extension = self.settings.poll.extension()?;
        let failure_extension = self.settings.poll.failure_extension()?;

        let url = self.transport.resolve_url(&queue_name).await?;
        let mut summary = PollSummary::default();

        info!(
            dead_letter_queue = ?dead_letter_queue.as_ref().map(QueueName::as_str),
            "Starting poll loop"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let messages = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.transport.receive_messages(&url, &request) => received?,
            };
            summary.iterations += 1;

            if messages.is_empty() {
                tokio::task::yield_now().await;
                continue;
            }

            let mut report = BatchReport::new(queue_name.clone(), dead_letter_queue.clone());
            for (index, message) in messages.iter().enumerate() {
                self.extend(&url, message, extension).await;

                match self
                    .process_message(&url, message, dead_letter_queue.as_ref(), failure_extension)
                    .await
                {
                    Ok(outcome) => report.push(message, outcome),
                    Err(e) => {
                        error!(
                            message_id = %message.message_id,
                            skipped = messages.len() - index - 1,
                            error = %e,
                            "Dead-letter dispatch failed, abandoning rest of batch"
                        );
                        report.push(
                            message,
                            MessageOutcome::Unresolved {
                                step: LifecycleStep::DeadLetter,
                                error: e.to_string(),
                            },
                        );
                        break;
                    }
                }
            }

            debug!(
                received = report.received(),
                deleted = report.deleted(),
                redirected = report.redirected(),
                unresolved = report.unresolved(),
                "Handled polled batch"
            );
            summary.absorb(&report);
        }

        info!(
            iterations = summary.iterations,
            received = summary.received,
            "Poll loop cancelled"
        );
        Ok(summary)
    }

    /// Extend every received message and copy it to `dead_letter_queue`
    ///
    /// Originals are never deleted; they reappear in the source queue once
    /// the extended window lapses unless a redrive policy moves them.
    #[instrument(skip(self), fields(queue = %queue, dead_letter_queue = %dead_letter_queue))]
    pub async fn retry_and_redirect(
        &self,
        queue: &str,
        dead_letter_queue: &str,
    ) -> Result<BatchReport, LifecycleError> {
        let (queue_name, dlq) = self.validate_pair(queue, dead_letter_queue)?;
        let failure_extension = self.settings.handling.failure_extension()?;

        let (url, messages) = self.receive_handling_batch(&queue_name).await?;

        let mut report = BatchReport::new(queue_name, Some(dlq.clone()));
        for message in &messages {
            let outcome = self
                .redirect(&url, message, &dlq, failure_extension, "redirected without processing")
                .await?;
            report.push(message, outcome);
        }

        info!(
            received = report.received(),
            redirected = report.redirected(),
            "Redirected batch to dead-letter queue"
        );
        Ok(report)
    }

    /// Receive a batch and delete every message without processing it
    #[instrument(skip(self), fields(queue = %queue))]
    pub async fn mark_as_read(&self, queue: &str) -> Result<BatchReport, LifecycleError> {
        let queue_name = self.directory.validate(queue)?;
        let (url, messages) = self.receive_handling_batch(&queue_name).await?;

        let mut report = BatchReport::new(queue_name, None);
        for message in &messages {
            let outcome = self.delete(&url, message).await;
            report.push(message, outcome);
        }

        info!(
            received = report.received(),
            deleted = report.deleted(),
            "Marked batch as read"
        );
        Ok(report)
    }

    /// Process a batch, deleting successes and dead-lettering failures
    ///
    /// A message whose delete fails after successful processing takes the
    /// failure path too, since the service never confirmed its removal.
    #[instrument(skip(self), fields(queue = %queue, dead_letter_queue = %dead_letter_queue))]
    pub async fn process_and_handle_failures(
        &self,
        queue: &str,
        dead_letter_queue: &str,
    ) -> Result<BatchReport, LifecycleError> {
        let (queue_name, dlq) = self.validate_pair(queue, dead_letter_queue)?;
        let failure_extension = self.settings.handling.failure_extension()?;

        let (url, messages) = self.receive_handling_batch(&queue_name).await?;

        let mut report = BatchReport::new(queue_name, Some(dlq.clone()));
        for message in &messages {
            let outcome = self
                .process_message(&url, message, Some(&dlq), failure_extension)
                .await?;
            report.push(message, outcome);
        }

        info!(
            received = report.received(),
            deleted = report.deleted(),
            redirected = report.redirected(),
            unresolved = report.unresolved(),
            "Processed batch"
        );
        Ok(report)
    }

    // ========================================================================
    // Per-message steps
    // ========================================================================

    fn validate_pair(
        &self,
        queue: &str,
        dead_letter_queue: &str,
    ) -> Result<(QueueName, QueueName), LifecycleError> {
        Ok((
            self.directory.validate(queue)?,
            self.directory.validate(dead_letter_queue)?,
        ))
    }

    async fn receive_handling_batch(
        &self,
        queue: &QueueName,
    ) -> Result<(QueueUrl, Vec<ReceivedMessage>), LifecycleError> {
        let request = self.settings.handling.receive_request()?;
        let url = self.transport.resolve_url(queue).await?;
        let messages = self.transport.receive_messages(&url, &request).await?;
        debug!(count = messages.len(), "Received batch");
        Ok((url, messages))
    }

    /// Run the processing step and settle the message
    ///
    /// Returns `Err` only when the dead-letter copy could not be sent.
    async fn process_message(
        &self,
        url: &QueueUrl,
        message: &ReceivedMessage,
        dead_letter_queue: Option<&QueueName>,
        failure_extension: VisibilityTimeout,
    ) -> Result<MessageOutcome, LifecycleError> {
        let reason = match self.processor.process(message).await {
            Ok(()) => match self.delete(url, message).await {
                MessageOutcome::Unresolved { error, .. } if dead_letter_queue.is_some() => {
                    format!("delete failed after processing: {}", error)
                }
                outcome => return Ok(outcome),
            },
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    error = %e,
                    "Processing failed"
                );
                e.to_string()
            }
        };

        match dead_letter_queue {
            Some(dlq) => {
                self.redirect(url, message, dlq, failure_extension, &reason)
                    .await
            }
            None => Ok(MessageOutcome::Unresolved {
                step: LifecycleStep::Process,
                error: reason,
            }),
        }
    }

    /// Extend the window, then send a copy to the dead-letter queue
    async fn redirect(
        &self,
        url: &QueueUrl,
        message: &ReceivedMessage,
        dead_letter_queue: &QueueName,
        extension: VisibilityTimeout,
        reason: &str,
    ) -> Result<MessageOutcome, LifecycleError> {
        let visibility_extended = self.extend(url, message, extension).await;

        let dlq_message_id = match self.dispatcher.send_to_dlq(dead_letter_queue, message).await
        {
            Ok(id) => id,
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    dead_letter_queue = %dead_letter_queue,
                    error = %e,
                    "Dead-letter dispatch failed"
                );
                return Err(e);
            }
        };

        info!(
            message_id = %message.message_id,
            dlq_message_id = %dlq_message_id,
            dead_letter_queue = %dead_letter_queue,
            "Redirected message to dead-letter queue"
        );

        Ok(MessageOutcome::Redirected {
            dlq_message_id,
            visibility_extended,
            reason: reason.to_string(),
        })
    }

    /// Change the message's window; a failure is logged and reported as `false`
    async fn extend(
        &self,
        url: &QueueUrl,
        message: &ReceivedMessage,
        timeout: VisibilityTimeout,
    ) -> bool {
        match self
            .transport
            .change_visibility(url, &message.receipt_handle, timeout)
            .await
        {
            Ok(()) => {
                debug!(
                    message_id = %message.message_id,
                    timeout_seconds = timeout.as_secs(),
                    "Extended visibility"
                );
                true
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    receipt_handle = ?message.receipt_handle,
                    error = %e,
                    "Failed to extend visibility"
                );
                false
            }
        }
    }

    async fn delete(&self, url: &QueueUrl, message: &ReceivedMessage) -> MessageOutcome {
        match self
            .transport
            .delete_message(url, &message.receipt_handle)
            .await
        {
            Ok(()) => {
                debug!(message_id = %message.message_id, "Deleted message");
                MessageOutcome::Deleted
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    receipt_handle = ?message.receipt_handle,
                    error = %e,
                    "Failed to delete message"
                );
                MessageOutcome::Unresolved {
                    step: LifecycleStep::Delete,
                    error: e.to_string(),
                }
            }
        }
    }
}

fn configuration_error(e: queue_warden_runtime::ValidationError) -> LifecycleError {
    LifecycleError::Configuration {
        message: e.to_string(),
    }
}
