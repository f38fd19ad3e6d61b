//! Transport trait and factory for queue service access.

use crate::error::QueueError;
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout,
};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, TransportConfig};
use crate::providers::{AwsSqsProvider, InMemoryProvider};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Thin interface over the remote queue service
///
/// Every call is a single request against the service. Implementations do not
/// retry; failures are surfaced to the caller as [`QueueError`].
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Resolve the URL of a named queue
    async fn resolve_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError>;

    /// Send a message, returning the identifier assigned by the service
    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError>;

    /// Receive up to `request.max_messages` messages
    ///
    /// Every returned message is hidden from other consumers for the requested
    /// visibility window. An empty result is not an error.
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Reset the visibility window of a received message, measured from now
    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
        timeout: VisibilityTimeout,
    ) -> Result<(), QueueError>;

    /// Permanently remove a received message
    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// List the URLs of all queues visible to the configured credentials
    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>, QueueError>;

    /// Approximate number of messages currently visible in the queue
    async fn approximate_message_count(&self, queue_url: &QueueUrl) -> Result<u64, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating transports from configuration
pub struct TransportFactory;

impl TransportFactory {
    /// Create a transport for the configured provider
    pub fn create(config: &TransportConfig) -> Result<Arc<dyn QueueTransport>, QueueError> {
        config.validate()?;

        match &config.provider {
            ProviderConfig::AwsSqs(aws_config) => {
                let provider =
                    AwsSqsProvider::new(aws_config.clone()).map_err(|e| e.to_queue_error())?;
                Ok(Arc::new(provider))
            }
            ProviderConfig::InMemory(memory_config) => {
                Ok(Arc::new(InMemoryProvider::new(memory_config.clone())))
            }
        }
    }

    /// Create an in-memory transport with default settings and auto-created queues
    pub fn create_test_transport() -> Arc<dyn QueueTransport> {
        Arc::new(InMemoryProvider::new(InMemoryConfig {
            auto_create_queues: true,
            ..Default::default()
        }))
    }
}
