//! Error types for lifecycle operations.

use queue_warden_runtime::QueueError;

/// Errors returned by the lifecycle controller and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Queue '{queue_name}' is not a known queue")]
    InvalidQueue { queue_name: String },

    #[error("Transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Processing of message {message_id} failed: {reason}")]
    ProcessingFailure { message_id: String, reason: String },

    #[error("Failed to send message {message_id} to dead-letter queue '{dead_letter_queue}': {source}")]
    DlqDispatch {
        dead_letter_queue: String,
        message_id: String,
        #[source]
        source: QueueError,
    },

    #[error("Invalid lifecycle configuration: {message}")]
    Configuration { message: String },
}

impl LifecycleError {
    /// Check if error is transient and the operation could succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidQueue { .. } => false,
            Self::Transport(e) => e.is_transient(),
            Self::ProcessingFailure { .. } => false,
            Self::DlqDispatch { source, .. } => source.is_transient(),
            Self::Configuration { .. } => false,
        }
    }
}

/// Failure reported by a processing step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    /// The message content is not acceptable
    #[error("Message rejected: {reason}")]
    Rejected { reason: String },

    /// Processing could not be completed
    #[error("Processing failed: {message}")]
    Failed { message: String },
}

impl ProcessingError {
    /// Shorthand for a rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Shorthand for a processing failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
