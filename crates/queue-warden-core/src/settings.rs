//! Per-operation receive and visibility settings.

use crate::error::LifecycleError;
use queue_warden_runtime::{QueueName, ReceiveRequest, VisibilityTimeout, WaitTime};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Settings for every lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub drain: DrainSettings,
    pub poll: PollSettings,
    pub handling: HandlingSettings,
}

impl LifecycleSettings {
    /// Validate all ranges
    pub fn validate(&self) -> Result<(), LifecycleError> {
        self.drain.receive_request()?;
        self.drain.extension()?;
        self.poll.receive_request()?;
        self.poll.extension()?;
        self.poll.failure_extension()?;
        self.poll.dead_letter_queue()?;
        self.handling.receive_request()?;
        self.handling.failure_extension()?;
        Ok(())
    }
}

/// Drain (receive once and mark as read)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainSettings {
    pub batch_size: u32,
    pub visibility_timeout_seconds: u32,
    /// Window applied to every received message before it is deleted
    pub extension_seconds: u32,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            visibility_timeout_seconds: 60,
            extension_seconds: 30,
        }
    }
}

impl DrainSettings {
    pub fn receive_request(&self) -> Result<ReceiveRequest, LifecycleError> {
        Ok(batch(self.batch_size)?.with_visibility_timeout(seconds(
            "drain.visibility_timeout_seconds",
            self.visibility_timeout_seconds,
        )?))
    }

    pub fn extension(&self) -> Result<VisibilityTimeout, LifecycleError> {
        seconds("drain.extension_seconds", self.extension_seconds)
    }
}

/// Continuous long-poll consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub batch_size: u32,
    pub wait_time_seconds: u32,
    /// Window applied to each message before it is processed
    pub extension_seconds: u32,
    /// Window applied to a message that failed processing
    pub failure_extension_seconds: u32,
    /// Where failed messages are copied; without one they are left for redelivery
    pub dead_letter_queue: Option<String>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait_time_seconds: 20,
            extension_seconds: 30,
            failure_extension_seconds: 60,
            dead_letter_queue: None,
        }
    }
}

impl PollSettings {
    /// Receive parameters for each iteration
    ///
    /// The loop relies on the long-poll wait to pace itself, so a zero wait is refused.
    pub fn receive_request(&self) -> Result<ReceiveRequest, LifecycleError> {
        if self.wait_time_seconds == 0 {
            return Err(LifecycleError::Configuration {
                message: "poll.wait_time_seconds: must be at least 1 second".to_string(),
            });
        }

        Ok(batch(self.batch_size)?
            .with_wait_time(wait("poll.wait_time_seconds", self.wait_time_seconds)?))
    }

    pub fn extension(&self) -> Result<VisibilityTimeout, LifecycleError> {
        seconds("poll.extension_seconds", self.extension_seconds)
    }

    pub fn failure_extension(&self) -> Result<VisibilityTimeout, LifecycleError> {
        seconds("poll.failure_extension_seconds", self.failure_extension_seconds)
    }

    /// Configured dead-letter queue, checked for a well-formed name
    pub fn dead_letter_queue(&self) -> Result<Option<QueueName>, LifecycleError> {
        self.dead_letter_queue
            .as_ref()
            .map(|name| {
                QueueName::new(name.clone()).map_err(|e| LifecycleError::Configuration {
                    message: format!("poll.dead_letter_queue: {}", e),
                })
            })
            .transpose()
    }
}

/// Redirect, mark-as-read and process-with-failure-handling operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlingSettings {
    pub batch_size: u32,
    pub visibility_timeout_seconds: u32,
    pub wait_time_seconds: u32,
    /// Window applied before a copy is sent to the dead-letter queue
    pub failure_extension_seconds: u32,
}

impl Default for HandlingSettings {
    fn default() -> Self {
        Self {
            batch_size: 2,
            visibility_timeout_seconds: 30,
            wait_time_seconds: 20,
            failure_extension_seconds: 60,
        }
    }
}

impl HandlingSettings {
    pub fn receive_request(&self) -> Result<ReceiveRequest, LifecycleError> {
        Ok(batch(self.batch_size)?
            .with_visibility_timeout(seconds(
                "handling.visibility_timeout_seconds",
                self.visibility_timeout_seconds,
            )?)
            .with_wait_time(wait("handling.wait_time_seconds", self.wait_time_seconds)?))
    }

    pub fn failure_extension(&self) -> Result<VisibilityTimeout, LifecycleError> {
        seconds(
            "handling.failure_extension_seconds",
            self.failure_extension_seconds,
        )
    }
}

fn batch(size: u32) -> Result<ReceiveRequest, LifecycleError> {
    ReceiveRequest::new(size).map_err(|e| LifecycleError::Configuration {
        message: format!("batch_size: {}", e),
    })
}

fn seconds(field: &str, value: u32) -> Result<VisibilityTimeout, LifecycleError> {
    VisibilityTimeout::new(value).map_err(|e| LifecycleError::Configuration {
        message: format!("{}: {}", field, e),
    })
}

fn wait(field: &str, value: u32) -> Result<WaitTime, LifecycleError> {
    WaitTime::new(value).map_err(|e| LifecycleError::Configuration {
        message: format!("{}: {}", field, e),
    })
}
