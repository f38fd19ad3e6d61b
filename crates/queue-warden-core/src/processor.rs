//! Pluggable processing step applied between receive and delete.

use crate::error::ProcessingError;
use async_trait::async_trait;
use queue_warden_runtime::ReceivedMessage;
use regex::Regex;
use tracing::debug;

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

/// Application logic run against each received message
///
/// Returning an error sends the message down the failure path: its visibility
/// is extended and a copy goes to the dead-letter queue. Messages may be
/// delivered more than once, so implementations must tolerate duplicates.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError>;
}

/// Processor that accepts every message
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl MessageProcessor for AcceptAll {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        debug!(message_id = %message.message_id, "Accepting message");
        Ok(())
    }
}

/// Processor backed by a synchronous closure
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&ReceivedMessage) -> Result<(), ProcessingError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> MessageProcessor for FnProcessor<F>
where
    F: Fn(&ReceivedMessage) -> Result<(), ProcessingError> + Send + Sync,
{
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        (self.f)(message)
    }
}

/// Processor that rejects messages whose body matches a pattern
#[derive(Debug, Clone)]
pub struct RejectMatching {
    pattern: Regex,
}

impl RejectMatching {
    /// Create from a regular expression
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Get the pattern source
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[async_trait]
impl MessageProcessor for RejectMatching {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        if self.pattern.is_match(&message.body) {
            return Err(ProcessingError::rejected(format!(
                "body matches /{}/",
                self.pattern
            )));
        }
        Ok(())
    }
}
