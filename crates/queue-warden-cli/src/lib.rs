//! # Queue-Warden CLI
//!
//! Command-line host for the Queue-Warden lifecycle controller.
//!
//! This module provides:
//! - Queue inspection (list, resolve, count) and sending
//! - Drain, mark-as-read, redirect and process operations on one batch
//! - A long-poll consumer that runs until interrupted
//! - Layered configuration loading and logging setup

use clap::{Parser, Subcommand};
use queue_warden_core::{
    AcceptAll, BatchReport, DrainOutcome, LifecycleController, LifecycleError, LifecycleSettings,
    MessageProcessor, PollSummary, QueueDirectory, RejectMatching,
};
use queue_warden_runtime::{
    ConfigurationError, ProviderConfig, QueueError, TransportConfig, TransportFactory,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prefix of environment variables that override configuration
pub const ENV_PREFIX: &str = "QW";

const REDACTED: &str = "<redacted>";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue-Warden CLI - message lifecycle control for managed queues
#[derive(Parser)]
#[command(name = "queue-warden")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Consume, drain and dead-letter messages on managed queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level; RUST_LOG takes precedence
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Output format; defaults to the configured format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the queues the transport knows about
    Queues,

    /// Resolve a queue's URL
    Url { queue: String },

    /// Send a message
    Send {
        queue: String,

        body: String,

        /// Message attribute as KEY=VALUE; repeatable
        #[arg(short, long = "attribute", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
    },

    /// Show the approximate number of visible messages
    Count { queue: String },

    /// Receive one batch and delete every message as read
    Receive {
        queue: String,

        /// Messages per receive (1-10)
        #[arg(long)]
        batch_size: Option<u32>,

        /// Visibility timeout granted by the receive, in seconds
        #[arg(long)]
        visibility_timeout: Option<u32>,
    },

    /// Long-poll a queue until interrupted with Ctrl-C
    Poll {
        queue: String,

        /// Queue that receives copies of failed messages
        #[arg(long)]
        dead_letter_queue: Option<String>,

        /// Reject bodies matching this regular expression
        #[arg(long)]
        reject: Option<String>,
    },

    /// Extend a batch and copy it to a dead-letter queue without deleting it
    Redirect {
        queue: String,
        dead_letter_queue: String,
    },

    /// Receive a batch and delete it without processing
    MarkRead { queue: String },

    /// Process a batch, deleting successes and dead-lettering failures
    Process {
        queue: String,

        dead_letter_queue: String,

        /// Reject bodies matching this regular expression
        #[arg(long)]
        reject: Option<String>,
    },

    /// Validate the configuration
    Config {
        /// Print the resolved configuration with secrets redacted
        #[arg(short, long)]
        show: bool,
    },
}

/// Output format options
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

fn parse_attribute(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, attribute)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), attribute.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Failed to render output: {message}")]
    Output { message: String },

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Lifecycle(LifecycleError::InvalidQueue { .. }) => 4,
            Self::Lifecycle(_) => 2,
            Self::Transport(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Output { .. } => 5,
            Self::Logging { .. } => 6,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid transport configuration: {0}")]
    Transport(#[from] ConfigurationError),

    #[error("Invalid lifecycle configuration: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Invalid log level '{level}': {message}")]
    InvalidLogLevel { level: String, message: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete Queue-Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub transport: TransportConfig,
    pub lifecycle: LifecycleSettings,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

impl WardenConfig {
    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        self.lifecycle.validate()?;
        self.logging.filter()?;
        Ok(())
    }

    /// Copy with secret credentials replaced by a placeholder
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let ProviderConfig::AwsSqs(aws) = &mut config.transport.provider {
            for secret in [&mut aws.secret_access_key, &mut aws.session_token] {
                if secret.is_some() {
                    *secret = Some(REDACTED.to_string());
                }
            }
        }
        config
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `queue_warden_core=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> Result<EnvFilter, ConfigError> {
        parse_filter(&self.level)
    }
}

/// Output formatting preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

fn parse_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(level).map_err(|e| ConfigError::InvalidLogLevel {
        level: level.to_string(),
        message: e.to_string(),
    })
}

/// Load configuration from the standard locations, an optional explicit file
/// and the process environment
///
/// Later sources override earlier ones:
/// 1. `/etc/queue-warden/warden.yaml`
/// 2. `./config/warden.yaml`
/// 3. the explicit file, whose format follows its extension
/// 4. `QW__`-prefixed environment variables, `__` separating nested keys
///    (e.g. `QW__LIFECYCLE__DRAIN__BATCH_SIZE=3`)
pub fn load_configuration(path: Option<&Path>) -> Result<WardenConfig, ConfigError> {
    load_configuration_with_env(path, None)
}

/// [`load_configuration`] reading overrides from `env` instead of the process
/// environment when given
pub fn load_configuration_with_env(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<WardenConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/queue-warden/warden")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/warden")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    let warden: WardenConfig = config.try_deserialize()?;
    warden.validate()?;
    Ok(warden)
}

/// Install the global tracing subscriber, writing to stderr
pub fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(level)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    initialize_logging(&level, cli.json_logs || config.logging.json)?;

    let format = cli.format.unwrap_or(config.output.format);
    let controller = build_controller(&config)?;
    let output = execute_command(&controller, &config, cli.command, format).await?;

    println!("{}", output.trim_end());
    Ok(())
}

/// Build a controller over the configured transport with an empty directory
pub fn build_controller(config: &WardenConfig) -> Result<LifecycleController, CliError> {
    let transport = TransportFactory::create(&config.transport)?;
    Ok(
        LifecycleController::new(transport, Arc::new(QueueDirectory::new()))
            .with_settings(config.lifecycle.clone()),
    )
}

/// Run one command and return its rendered output
///
/// The directory is refreshed before any command that names a queue.
pub async fn execute_command(
    controller: &LifecycleController,
    config: &WardenConfig,
    command: Commands,
    format: OutputFormat,
) -> Result<String, CliError> {
    match command {
        Commands::Queues => {
            let names = controller.list_queues().await?;
            render(&names, format, |names| {
                names
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Url { queue } => {
            controller.refresh_directory().await?;
            let url = controller.queue_url(&queue).await?;
            render(&url, format, |url| url.to_string())
        }
        Commands::Send {
            queue,
            body,
            attributes,
        } => {
            controller.refresh_directory().await?;
            let attributes: HashMap<String, String> = attributes.into_iter().collect();
            let message_id = controller.send_message(&queue, body, attributes).await?;
            render(&message_id, format, |id| id.to_string())
        }
        Commands::Count { queue } => {
            controller.refresh_directory().await?;
            let count = controller.approximate_message_count(&queue).await?;
            render(&count, format, |count| count.to_string())
        }
        Commands::Receive {
            queue,
            batch_size,
            visibility_timeout,
        } => {
            controller.refresh_directory().await?;
            let drain = &config.lifecycle.drain;
            let outcome = controller
                .receive_once(
                    &queue,
                    batch_size.unwrap_or(drain.batch_size),
                    visibility_timeout.unwrap_or(drain.visibility_timeout_seconds),
                )
                .await?;

            match outcome {
                DrainOutcome::Drained(report) => render(&report, format, BatchReport::summary),
                DrainOutcome::InvalidQueue { queue } => Err(CliError::InvalidArgument {
                    arg: "queue".to_string(),
                    message: format!("'{}' is not a known queue", queue),
                }),
            }
        }
        Commands::Poll {
            queue,
            dead_letter_queue,
            reject,
        } => {
            controller.refresh_directory().await?;
            let mut settings = config.lifecycle.clone();
            if dead_letter_queue.is_some() {
                settings.poll.dead_letter_queue = dead_letter_queue;
            }
            let controller = controller
                .clone()
                .with_settings(settings)
                .with_processor(processor(reject.as_deref())?);

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping poll loop");
                    signal_token.cancel();
                }
            });

            let summary = controller.poll_forever(&queue, cancel).await?;
            render(&summary, format, poll_summary_text)
        }
        Commands::Redirect {
            queue,
            dead_letter_queue,
        } => {
            controller.refresh_directory().await?;
            let report = controller
                .retry_and_redirect(&queue, &dead_letter_queue)
                .await?;
            render(&report, format, BatchReport::summary)
        }
        Commands::MarkRead { queue } => {
            controller.refresh_directory().await?;
            let report = controller.mark_as_read(&queue).await?;
            render(&report, format, BatchReport::summary)
        }
        Commands::Process {
            queue,
            dead_letter_queue,
            reject,
        } => {
            controller.refresh_directory().await?;
            let controller = controller
                .clone()
                .with_processor(processor(reject.as_deref())?);
            let report = controller
                .process_and_handle_failures(&queue, &dead_letter_queue)
                .await?;
            render(&report, format, BatchReport::summary)
        }
        Commands::Config { show } => {
            if !show {
                return Ok("Configuration is valid".to_string());
            }
            let redacted = config.redacted();
            match format {
                // Text has no structure of its own for nested settings
                OutputFormat::Text => render(&redacted, OutputFormat::Yaml, |_| String::new()),
                other => render(&redacted, other, |_| String::new()),
            }
        }
    }
}

fn processor(reject: Option<&str>) -> Result<Arc<dyn MessageProcessor>, CliError> {
    match reject {
        Some(pattern) => {
            let processor =
                RejectMatching::new(pattern).map_err(|e| CliError::InvalidArgument {
                    arg: "reject".to_string(),
                    message: e.to_string(),
                })?;
            Ok(Arc::new(processor))
        }
        None => Ok(Arc::new(AcceptAll)),
    }
}

fn poll_summary_text(summary: &PollSummary) -> String {
    format!(
        "Polled {} batch(es): {} received, {} deleted, {} redirected, {} unresolved",
        summary.iterations,
        summary.received,
        summary.deleted,
        summary.redirected,
        summary.unresolved
    )
}

fn render<T: Serialize>(
    value: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(text(value)),
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
