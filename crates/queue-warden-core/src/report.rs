//! Per-message outcomes and batch reports.

use queue_warden_runtime::{MessageId, QueueName, ReceivedMessage};
use serde::Serialize;
use std::fmt;

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;

// ============================================================================
// Outcomes
// ============================================================================

/// Step of the message lifecycle a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Process,
    Delete,
    DeadLetter,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Process => "process",
            Self::Delete => "delete",
            Self::DeadLetter => "dead-letter",
        };
        write!(f, "{}", step)
    }
}

/// What happened to one received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// The service acknowledged the delete
    Deleted,
    /// A copy was sent to the dead-letter queue; the original stays in the source queue
    Redirected {
        dlq_message_id: MessageId,
        /// Whether the visibility extension preceding the copy succeeded
        visibility_extended: bool,
        reason: String,
    },
    /// A call failed; the message stays in the source queue and reappears after its window
    Unresolved { step: LifecycleStep, error: String },
}

/// Outcome of one message within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    pub message_id: MessageId,
    pub body: String,
    #[serde(flatten)]
    pub outcome: MessageOutcome,
}

impl MessageReport {
    pub fn new(message: &ReceivedMessage, outcome: MessageOutcome) -> Self {
        Self {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            outcome,
        }
    }
}

// ============================================================================
// Batch Report
// ============================================================================

/// Outcomes of every message handled by one operation, in receive order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub queue: QueueName,
    pub dead_letter_queue: Option<QueueName>,
    pub messages: Vec<MessageReport>,
}

impl BatchReport {
    pub fn new(queue: QueueName, dead_letter_queue: Option<QueueName>) -> Self {
        Self {
            queue,
            dead_letter_queue,
            messages: Vec::new(),
        }
    }

    /// Record the outcome of a message
    pub fn push(&mut self, message: &ReceivedMessage, outcome: MessageOutcome) {
        self.messages.push(MessageReport::new(message, outcome));
    }

    /// Number of messages received
    pub fn received(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Deleted))
    }

    pub fn redirected(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Redirected { .. }))
    }

    pub fn unresolved(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Unresolved { .. }))
    }

    /// Bodies of messages with the given outcome kind, in receive order
    pub fn bodies_where(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| predicate(&m.outcome))
            .map(|m| m.body.as_str())
            .collect()
    }

    /// Human-readable summary listing the handled bodies
    pub fn summary(&self) -> String {
        if self.messages.is_empty() {
            return format!("No messages received from '{}'", self.queue);
        }

        let mut lines = vec![format!(
            "{} message(s) from '{}': {} deleted, {} redirected, {} unresolved",
            self.received(),
            self.queue,
            self.deleted(),
            self.redirected(),
            self.unresolved()
        )];

        for message in &self.messages {
            let line = match &message.outcome {
                MessageOutcome::Deleted => format!("  deleted     {}", message.body),
                MessageOutcome::Redirected { .. } => {
                    let target = self
                        .dead_letter_queue
                        .as_ref()
                        .map(|q| q.as_str())
                        .unwrap_or("dead-letter queue");
                    format!("  redirected  {} -> {}", message.body, target)
                }
                MessageOutcome::Unresolved { step, error } => {
                    format!("  unresolved  {} ({} failed: {})", message.body, step, error)
                }
            };
            lines.push(line);
        }

        lines.join("\n")
    }

    fn count(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.messages.iter().filter(|m| predicate(&m.outcome)).count()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Result of a drain call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// The queue is not in the directory; nothing was received
    InvalidQueue { queue: String },
    Drained(BatchReport),
}

/// Totals accumulated by a polling loop until it was cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Receive calls completed
    pub iterations: u64,
    pub received: u64,
    pub deleted: u64,
    pub redirected: u64,
    pub unresolved: u64,
}

impl PollSummary {
    /// Add the outcomes of one batch
    pub fn absorb(&mut self, report: &BatchReport) {
        self.received += report.received() as u64;
        self.deleted += report.deleted() as u64;
        self.redirected += report.redirected() as u64;
        self.unresolved += report.unresolved() as u64;
    }
}
