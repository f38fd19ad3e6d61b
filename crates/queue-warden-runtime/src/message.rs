//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Maximum number of messages a single receive call may return
pub const MAX_BATCH_SIZE: u32 = 10;

/// Maximum visibility timeout accepted by the service (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 43_200;

/// Maximum long-poll wait accepted by the service
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

const MAX_QUEUE_NAME_LENGTH: usize = 80;
const FIFO_SUFFIX: &str = ".fifo";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following the managed-queue naming rules
///
/// Names are 1-80 characters of ASCII alphanumerics, hyphens and underscores,
/// optionally ending in `.fifo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", MAX_QUEUE_NAME_LENGTH),
            });
        }

        let base = name.strip_suffix(FIFO_SUFFIX).unwrap_or(&name);
        if base.is_empty()
            || !base
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Check if this names a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(FIFO_SUFFIX)
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Location of a queue as returned by the service
///
/// The URL is opaque except for its final path segment, which is the queue name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create new queue URL
    pub fn new(url: String) -> Result<Self, ValidationError> {
        if url.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "queue_url".to_string(),
            });
        }

        Ok(Self(url))
    }

    /// Extract the queue name from the last path segment of the URL
    pub fn queue_name(&self) -> Result<QueueName, ValidationError> {
        let segment = self
            .0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        QueueName::new(segment.to_string())
    }

    /// Get URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque, single-use token for deleting a received message or changing its visibility
///
/// A handle is only valid for the receive that produced it. Once the message
/// is deleted, re-received, or its window lapses, the handle goes stale.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form suitable for log output
    pub fn abbreviated(&self) -> String {
        let prefix: String = self.0.chars().take(12).collect();
        if prefix.len() < self.0.len() {
            format!("{}...", prefix)
        } else {
            prefix
        }
    }
}

// Receipt handles are long and effectively credentials for the message; keep
// them out of debug output.
impl fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReceiptHandle")
            .field(&self.abbreviated())
            .finish()
    }
}

/// Number of seconds a received message stays hidden from other consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct VisibilityTimeout(u32);

impl VisibilityTimeout {
    /// Create new visibility timeout with validation
    pub fn new(seconds: u32) -> Result<Self, ValidationError> {
        if seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "visibility_timeout".to_string(),
                message: format!("must be 0-{} seconds", MAX_VISIBILITY_TIMEOUT_SECONDS),
            });
        }

        Ok(Self(seconds))
    }

    /// Get timeout in whole seconds
    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Get timeout as a duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }
}

impl TryFrom<u32> for VisibilityTimeout {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VisibilityTimeout> for u32 {
    fn from(timeout: VisibilityTimeout) -> Self {
        timeout.0
    }
}

impl fmt::Display for VisibilityTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Long-poll wait for a receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WaitTime(u32);

impl WaitTime {
    /// Create new wait time with validation
    pub fn new(seconds: u32) -> Result<Self, ValidationError> {
        if seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "wait_time".to_string(),
                message: format!("must be 0-{} seconds", MAX_WAIT_TIME_SECONDS),
            });
        }

        Ok(Self(seconds))
    }

    /// Get wait time in whole seconds
    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Get wait time as a duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }
}

impl TryFrom<u32> for WaitTime {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WaitTime> for u32 {
    fn from(wait: WaitTime) -> Self {
        wait.0
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent to a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub body: String,
    pub attributes: HashMap<String, String>,
    /// Ordering group, required when sending to a FIFO queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    /// Deduplication token for FIFO queues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_id: Option<String>,
}

impl OutgoingMessage {
    /// Create new message with body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: HashMap::new(),
            message_group_id: None,
            deduplication_id: None,
        }
    }

    /// Set the FIFO ordering group
    pub fn with_message_group_id(mut self, group: impl Into<String>) -> Self {
        self.message_group_id = Some(group.into());
        self
    }

    /// Set the FIFO deduplication token
    pub fn with_deduplication_id(mut self, token: impl Into<String>) -> Self {
        self.deduplication_id = Some(token.into());
        self
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace all message attributes
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A message received from a queue, held within one visibility window
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    #[serde(skip_serializing)]
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    pub attributes: HashMap<String, String>,
    /// How many times the service has handed this message out, including this one
    pub receive_count: u32,
    /// Ordering group the message was sent with, for messages from FIFO queues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
}

impl ReceivedMessage {
    /// Build a copy carrying the same body, attributes and ordering group
    ///
    /// The deduplication token is the message id, so repeated copies of one
    /// message collapse on a FIFO destination.
    pub fn to_outgoing(&self) -> OutgoingMessage {
        OutgoingMessage {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
            message_group_id: self.message_group_id.clone(),
            deduplication_id: Some(self.message_id.to_string()),
        }
    }
}

// ============================================================================
// Receive Options
// ============================================================================

/// Parameters of a single receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Maximum number of messages to receive in the batch (1-10)
    pub max_messages: u32,
    /// Window granted to every returned message; `None` uses the queue default
    pub visibility_timeout: Option<VisibilityTimeout>,
    /// Long-poll wait; `None` returns immediately
    pub wait_time: Option<WaitTime>,
}

impl ReceiveRequest {
    /// Create new receive request for up to `max_messages` messages
    pub fn new(max_messages: u32) -> Result<Self, ValidationError> {
        if max_messages == 0 || max_messages > MAX_BATCH_SIZE {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: format!("must be 1-{}", MAX_BATCH_SIZE),
            });
        }

        Ok(Self {
            max_messages,
            visibility_timeout: None,
            wait_time: None,
        })
    }

    /// Set the visibility window granted by this receive
    pub fn with_visibility_timeout(mut self, timeout: VisibilityTimeout) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    /// Enable long polling
    pub fn with_wait_time(mut self, wait: WaitTime) -> Self {
        self.wait_time = Some(wait);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
