//! # Queue-Warden Core
//!
//! Consumer-side message lifecycle for managed queues.
//!
//! A [`LifecycleController`] receives batches through a
//! [`QueueTransport`](queue_warden_runtime::QueueTransport), runs a pluggable
//! [`MessageProcessor`] against each message, deletes successes, and copies
//! failures to a dead-letter queue through the [`DeadLetterDispatcher`].
//! Queue names are checked against a [`QueueDirectory`] before any call is
//! made, and every message handled gets its own [`MessageOutcome`] in the
//! returned [`BatchReport`].
//!
//! Delivery is at-least-once. A crash between processing and delete means the
//! message is redelivered after its visibility window lapses.

pub mod controller;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod report;
pub mod settings;

pub use controller::LifecycleController;
pub use directory::QueueDirectory;
pub use dispatcher::DeadLetterDispatcher;
pub use error::{LifecycleError, ProcessingError};
pub use processor::{AcceptAll, FnProcessor, MessageProcessor, RejectMatching};
pub use report::{
    BatchReport, DrainOutcome, LifecycleStep, MessageOutcome, MessageReport, PollSummary,
};
pub use settings::{DrainSettings, HandlingSettings, LifecycleSettings, PollSettings};

pub use tokio_util::sync::CancellationToken;
