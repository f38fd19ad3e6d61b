//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AwsSqs => 256 * 1024,         // 256KB
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwsSqs => write!(f, "aws_sqs"),
            Self::InMemory => write!(f, "in_memory"),
        }
    }
}

/// Configuration for transport initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub provider: ProviderConfig,
}

impl TransportConfig {
    /// Validate the provider-specific settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match &self.provider {
            ProviderConfig::AwsSqs(config) => config.validate(),
            ProviderConfig::InMemory(config) => config.validate(),
        }
    }

    /// Get the provider type this configuration selects
    pub fn provider_type(&self) -> ProviderType {
        match &self.provider {
            ProviderConfig::AwsSqs(_) => ProviderType::AwsSqs,
            ProviderConfig::InMemory(_) => ProviderType::InMemory,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::InMemory(InMemoryConfig::default()),
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

/// AWS SQS configuration
///
/// Credentials left unset are read from `AWS_ACCESS_KEY_ID`,
/// `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN` when the transport is built.
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsSqsConfig {
    pub region: String,
    /// Override for the service endpoint (e.g. a local emulator)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Per-request HTTP timeout; must exceed the longest long-poll wait
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl AwsSqsConfig {
    /// Create configuration for a region with defaults for everything else
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Use a custom service endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use explicit static credentials
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Get the request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "transport.provider.region".to_string(),
            });
        }

        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigurationError::Invalid {
                message: "access_key_id and secret_access_key must be set together".to_string(),
            });
        }

        if self.request_timeout_seconds <= u64::from(crate::message::MAX_WAIT_TIME_SECONDS) {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "request_timeout_seconds must exceed the maximum long-poll wait of {}s",
                    crate::message::MAX_WAIT_TIME_SECONDS
                ),
            });
        }

        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
                message: format!("invalid endpoint '{}': {}", endpoint, e),
            })?;
        }

        Ok(())
    }
}

impl fmt::Debug for AwsSqsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Prefix used to build queue URLs
    pub account_url: String,
    /// Create queues on first use instead of reporting them missing
    pub auto_create_queues: bool,
    pub max_message_size: usize,
    /// Window used when a receive does not request one
    pub default_visibility_timeout_seconds: u32,
    /// Queues created when the provider starts
    pub queues: Vec<String>,
}

impl InMemoryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.account_url.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "transport.provider.account_url".to_string(),
            });
        }

        if self.max_message_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_message_size must be greater than zero".to_string(),
            });
        }

        if self.default_visibility_timeout_seconds > crate::message::MAX_VISIBILITY_TIMEOUT_SECONDS
        {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "default_visibility_timeout_seconds must be at most {}",
                    crate::message::MAX_VISIBILITY_TIMEOUT_SECONDS
                ),
            });
        }

        for name in &self.queues {
            crate::message::QueueName::new(name.clone()).map_err(|e| {
                ConfigurationError::Invalid {
                    message: format!("invalid queue '{}': {}", name, e),
                }
            })?;
        }

        Ok(())
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            account_url: "http://localhost:9324/000000000000".to_string(),
            auto_create_queues: false,
            max_message_size: ProviderType::InMemory.max_message_size(),
            default_visibility_timeout_seconds: 30,
            queues: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
