//! Common test utilities for queue-warden integration tests
//!
//! This module provides:
//! - A controller wired to an in-memory transport behind a recording decorator
//! - Processing steps with deterministic failures
//! - Helpers for reading back recorded calls

use queue_warden_core::{
    FnProcessor, LifecycleController, LifecycleSettings, MessageProcessor, ProcessingError,
    QueueDirectory,
};
use queue_warden_runtime::{
    InMemoryConfig, InMemoryProvider, OutgoingMessage, QueueName, QueueTransport,
    ReceivedMessage, RecordingTransport, TransportCall, TransportOperation,
};
use std::sync::Arc;

// ============================================================================
// Test Harness
// ============================================================================

/// Controller over an in-memory transport with every call recorded
#[allow(dead_code)]
pub struct TestWarden {
    pub memory: Arc<InMemoryProvider>,
    pub recording: Arc<RecordingTransport>,
    pub controller: LifecycleController,
}

#[allow(dead_code)]
impl TestWarden {
    /// Create the queues and a controller whose directory has not been refreshed
    pub fn unrefreshed(queues: &[&str]) -> Self {
        let memory = Arc::new(InMemoryProvider::new(InMemoryConfig {
            queues: queues.iter().map(|q| q.to_string()).collect(),
            ..Default::default()
        }));
        let recording = Arc::new(RecordingTransport::new(memory.clone()));
        let controller =
            LifecycleController::new(recording.clone(), Arc::new(QueueDirectory::new()));

        Self {
            memory,
            recording,
            controller,
        }
    }

    /// Create the queues and refresh the directory from the transport
    pub async fn new(queues: &[&str]) -> Self {
        let warden = Self::unrefreshed(queues);
        warden
            .controller
            .refresh_directory()
            .await
            .expect("directory refresh should succeed");
        warden.recording.clear_calls();
        warden
    }

    pub fn with_processor(mut self, processor: Arc<dyn MessageProcessor>) -> Self {
        self.controller = self.controller.with_processor(processor);
        self
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.controller = self.controller.with_settings(settings);
        self
    }

    /// Send bodies straight to the provider, bypassing the recorder
    pub async fn seed(&self, queue: &str, bodies: &[&str]) {
        let url = self
            .memory
            .resolve_url(&queue_name(queue))
            .await
            .expect("queue should exist");
        for body in bodies {
            self.memory
                .send_message(&url, &OutgoingMessage::new(*body))
                .await
                .expect("seed send should succeed");
        }
    }

    /// Bodies still held by a queue, visible or not
    pub fn bodies(&self, queue: &str) -> Vec<String> {
        self.memory
            .message_bodies(&queue_name(queue))
            .expect("queue should exist")
    }

    /// Bodies of recorded delete calls, in order
    pub fn deleted_bodies(&self) -> Vec<String> {
        self.recording
            .calls_for(TransportOperation::Delete)
            .iter()
            .filter_map(|c| c.body().map(str::to_string))
            .collect()
    }

    /// Bodies of recorded send calls to `queue`, in order
    pub fn sent_to(&self, queue: &str) -> Vec<String> {
        self.recording
            .calls_for(TransportOperation::Send)
            .iter()
            .filter(|c| c.queue() == Some(queue))
            .filter_map(|c| c.body().map(str::to_string))
            .collect()
    }

    /// Recorded visibility changes as (body, timeout) pairs
    pub fn visibility_changes(&self) -> Vec<(String, u32)> {
        self.recording
            .calls_for(TransportOperation::ChangeVisibility)
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::ChangeVisibility {
                    body: Some(body),
                    timeout,
                    ..
                } => Some((body, timeout)),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Processing Steps
// ============================================================================

/// Processing step that rejects exactly the given bodies
#[allow(dead_code)]
pub fn fail_on(bodies: &[&str]) -> Arc<dyn MessageProcessor> {
    let rejected: Vec<String> = bodies.iter().map(|b| b.to_string()).collect();
    Arc::new(FnProcessor::new(move |message: &ReceivedMessage| {
        if rejected.contains(&message.body) {
            Err(ProcessingError::rejected(format!("'{}' is not accepted", message.body)))
        } else {
            Ok(())
        }
    }))
}

#[allow(dead_code)]
pub fn queue_name(value: &str) -> QueueName {
    QueueName::new(value.to_string()).expect("test queue names are valid")
}
