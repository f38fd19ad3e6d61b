//! # Queue Warden Runtime
//!
//! Transport layer for a managed message-queue service with visibility
//! timeouts, receipt handles and long polling.
//!
//! This library provides:
//! - Validated identifiers for queues, messages and receipts
//! - The [`QueueTransport`] trait, one method per service request
//! - An AWS SQS transport speaking the HTTP Query API
//! - An in-memory transport with real visibility and long-poll semantics
//! - A recording decorator with fault injection for exercising consumers
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all transport operations
//! - [`message`] - Message structures, identifiers and receive options
//! - [`provider`] - Provider types and configuration
//! - [`transport`] - Transport trait and factory
//! - [`providers`] - Concrete transports

pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout, WaitTime, MAX_BATCH_SIZE, MAX_VISIBILITY_TIMEOUT_SECONDS,
    MAX_WAIT_TIME_SECONDS,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType, TransportConfig};
pub use providers::{
    AwsSqsProvider, InMemoryProvider, QueueDepth, RecordingTransport, TransportCall,
    TransportOperation,
};
pub use transport::{QueueTransport, TransportFactory};
