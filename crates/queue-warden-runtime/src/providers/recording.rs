//! Recording transport decorator with fault injection.
//!
//! Wraps another transport, records every call made through it, and can be
//! told to fail selected operations. Used to observe the exact sequence of
//! service calls a consumer makes and to exercise its failure paths.

use crate::error::QueueError;
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout,
};
use crate::provider::ProviderType;
use crate::transport::QueueTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
#[path = "recording_tests.rs"]
mod tests;

/// Kinds of transport operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOperation {
    ResolveUrl,
    Send,
    Receive,
    ChangeVisibility,
    Delete,
    ListQueues,
    ApproximateCount,
}

/// A single recorded call
///
/// Queues are recorded by name. Calls that act on a receipt carry the body of
/// the message the receipt was issued for, when it came through this transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    ResolveUrl {
        queue: String,
    },
    Send {
        queue: String,
        body: String,
    },
    Receive {
        queue: String,
        max_messages: u32,
        visibility_timeout: Option<u32>,
        wait_time: Option<u32>,
    },
    ChangeVisibility {
        queue: String,
        body: Option<String>,
        timeout: u32,
    },
    Delete {
        queue: String,
        body: Option<String>,
    },
    ListQueues,
    ApproximateCount {
        queue: String,
    },
}

impl TransportCall {
    /// Operation kind of this call
    pub fn operation(&self) -> TransportOperation {
        match self {
            Self::ResolveUrl { .. } => TransportOperation::ResolveUrl,
            Self::Send { .. } => TransportOperation::Send,
            Self::Receive { .. } => TransportOperation::Receive,
            Self::ChangeVisibility { .. } => TransportOperation::ChangeVisibility,
            Self::Delete { .. } => TransportOperation::Delete,
            Self::ListQueues => TransportOperation::ListQueues,
            Self::ApproximateCount { .. } => TransportOperation::ApproximateCount,
        }
    }

    /// Queue name the call targeted, if any
    pub fn queue(&self) -> Option<&str> {
        match self {
            Self::ResolveUrl { queue }
            | Self::Send { queue, .. }
            | Self::Receive { queue, .. }
            | Self::ChangeVisibility { queue, .. }
            | Self::Delete { queue, .. }
            | Self::ApproximateCount { queue } => Some(queue),
            Self::ListQueues => None,
        }
    }

    /// Message body the call carried or acted on, if known
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Send { body, .. } => Some(body),
            Self::ChangeVisibility { body, .. } | Self::Delete { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    fn matches(&self, target: &str) -> bool {
        self.queue() == Some(target) || self.body() == Some(target)
    }
}

struct FaultRule {
    operation: TransportOperation,
    /// Queue name or message body the call must involve
    target: Option<String>,
    /// Remaining failures; `None` fails forever
    remaining: Option<u32>,
}

/// Transport decorator that records calls and injects faults
pub struct RecordingTransport {
    inner: Arc<dyn QueueTransport>,
    calls: Mutex<Vec<TransportCall>>,
    faults: Mutex<Vec<FaultRule>>,
    bodies_by_receipt: Mutex<HashMap<String, String>>,
}

impl RecordingTransport {
    /// Wrap a transport
    pub fn new(inner: Arc<dyn QueueTransport>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            bodies_by_receipt: Mutex::new(HashMap::new()),
        }
    }

    /// All calls recorded so far, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Recorded calls of one kind, in order
    pub fn calls_for(&self, operation: TransportOperation) -> Vec<TransportCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    /// Number of recorded calls of one kind
    pub fn count(&self, operation: TransportOperation) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Fail every call of an operation
    pub fn fail_always(&self, operation: TransportOperation) {
        self.add_fault(operation, None, None);
    }

    /// Fail the next `times` calls of an operation
    pub fn fail_times(&self, operation: TransportOperation, times: u32) {
        self.add_fault(operation, None, Some(times));
    }

    /// Fail every call of an operation that involves the given queue name or message body
    pub fn fail_matching(&self, operation: TransportOperation, target: impl Into<String>) {
        self.add_fault(operation, Some(target.into()), None);
    }

    /// Remove all fault rules
    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    fn add_fault(&self, operation: TransportOperation, target: Option<String>, remaining: Option<u32>) {
        lock(&self.faults).push(FaultRule {
            operation,
            target,
            remaining,
        });
    }

    /// Record a call and decide whether it should fail
    fn record(&self, call: TransportCall) -> Result<(), QueueError> {
        let operation = call.operation();
        let injected = {
            let mut faults = lock(&self.faults);
            let hit = faults.iter_mut().find(|rule| {
                rule.operation == operation
                    && rule.remaining != Some(0)
                    && rule.target.as_deref().map_or(true, |t| call.matches(t))
            });

            match hit {
                Some(rule) => {
                    if let Some(remaining) = rule.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    true
                }
                None => false,
            }
        };

        lock(&self.calls).push(call);

        if injected {
            return Err(QueueError::ConnectionFailed {
                message: format!("injected fault for {:?}", operation),
            });
        }

        Ok(())
    }

    fn body_for(&self, receipt: &ReceiptHandle) -> Option<String> {
        lock(&self.bodies_by_receipt).get(receipt.as_str()).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn queue_label(queue_url: &QueueUrl) -> String {
    queue_url
        .queue_name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| queue_url.to_string())
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn resolve_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        self.record(TransportCall::ResolveUrl {
            queue: queue.to_string(),
        })?;
        self.inner.resolve_url(queue).await
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError> {
        self.record(TransportCall::Send {
            queue: queue_label(queue_url),
            body: message.body.clone(),
        })?;
        self.inner.send_message(queue_url, message).await
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.record(TransportCall::Receive {
            queue: queue_label(queue_url),
            max_messages: request.max_messages,
            visibility_timeout: request.visibility_timeout.map(|t| t.as_secs()),
            wait_time: request.wait_time.map(|w| w.as_secs()),
        })?;

        let messages = self.inner.receive_messages(queue_url, request).await?;
        {
            let mut bodies = lock(&self.bodies_by_receipt);
            for message in &messages {
                bodies.insert(
                    message.receipt_handle.as_str().to_string(),
                    message.body.clone(),
                );
            }
        }

        Ok(messages)
    }

    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
        timeout: VisibilityTimeout,
    ) -> Result<(), QueueError> {
        self.record(TransportCall::ChangeVisibility {
            queue: queue_label(queue_url),
            body: self.body_for(receipt),
            timeout: timeout.as_secs(),
        })?;
        self.inner.change_visibility(queue_url, receipt, timeout).await
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.record(TransportCall::Delete {
            queue: queue_label(queue_url),
            body: self.body_for(receipt),
        })?;
        self.inner.delete_message(queue_url, receipt).await
    }

    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>, QueueError> {
        self.record(TransportCall::ListQueues)?;
        self.inner.list_queue_urls().await
    }

    async fn approximate_message_count(&self, queue_url: &QueueUrl) -> Result<u64, QueueError> {
        self.record(TransportCall::ApproximateCount {
            queue: queue_label(queue_url),
        })?;
        self.inner.approximate_message_count(queue_url).await
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }
}
