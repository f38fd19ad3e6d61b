//! Queue transport implementations.
//!
//! This module contains concrete implementations of the `QueueTransport` trait
//! for different backends, plus a recording decorator for observing traffic.

pub mod aws;
pub mod memory;
pub mod recording;

pub use aws::{AwsError, AwsSqsProvider};
pub use memory::{InMemoryProvider, QueueDepth};
pub use recording::{RecordingTransport, TransportCall, TransportOperation};
