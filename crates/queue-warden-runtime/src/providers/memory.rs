//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Hides received messages for their visibility window and redelivers them afterwards
//! - Issues a fresh receipt handle on every receive, invalidating earlier ones
//! - Supports long polling, waking on new messages or expiring windows
//! - Provides thread-safe concurrent access
//!
//! Time is measured with `tokio::time`, so tests running on a paused clock can
//! advance through visibility windows deterministically.

use crate::error::QueueError;
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityTimeout,
};
use crate::provider::{InMemoryConfig, ProviderType};
use crate::transport::QueueTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    url: QueueUrl,
    /// Messages in send order, including in-flight ones
    messages: Vec<StoredMessage>,
}

impl InMemoryQueue {
    fn new(url: QueueUrl) -> Self {
        Self {
            url,
            messages: Vec::new(),
        }
    }

    /// Earliest instant at which a currently hidden message becomes visible
    fn next_visibility_change(&self, now: Instant) -> Option<Instant> {
        self.messages
            .iter()
            .filter(|m| m.visible_at > now)
            .map(|m| m.visible_at)
            .min()
    }
}

/// A message stored in the queue with metadata
struct StoredMessage {
    message_id: MessageId,
    body: String,
    attributes: HashMap<String, String>,
    message_group_id: Option<String>,
    receive_count: u32,
    visible_at: Instant,
    /// Receipt issued by the most recent receive
    receipt: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        now >= self.visible_at
    }

    fn holds_receipt(&self, receipt: &ReceiptHandle) -> bool {
        self.receipt.as_deref() == Some(receipt.as_str())
    }
}

/// Visible and in-flight message counts for a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: usize,
    pub in_flight: usize,
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
pub struct InMemoryProvider {
    storage: Arc<Mutex<QueueStorage>>,
    arrivals: Arc<Notify>,
    config: InMemoryConfig,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    ///
    /// Queues listed in the configuration are created immediately.
    pub fn new(config: InMemoryConfig) -> Self {
        let provider = Self {
            storage: Arc::new(Mutex::new(QueueStorage {
                queues: HashMap::new(),
            })),
            arrivals: Arc::new(Notify::new()),
            config,
        };

        for name in provider.config.queues.clone() {
            match QueueName::new(name.clone()) {
                Ok(queue) => {
                    if let Err(e) = provider.create_queue(&queue) {
                        warn!(queue = %name, error = %e, "Failed to create configured queue");
                    }
                }
                Err(e) => warn!(queue = %name, error = %e, "Skipping invalid configured queue"),
            }
        }

        provider
    }

    /// Create a queue if it does not exist yet, returning its URL
    pub fn create_queue(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        let mut storage = self.lock_storage()?;
        let url = self.queue_url_for(queue)?;
        let entry = storage
            .queues
            .entry(queue.clone())
            .or_insert_with(|| InMemoryQueue::new(url));

        Ok(entry.url.clone())
    }

    /// Visible and in-flight counts for a queue
    pub fn queue_depth(&self, queue: &QueueName) -> Result<QueueDepth, QueueError> {
        let storage = self.lock_storage()?;
        let entry = storage
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        let now = Instant::now();
        let visible = entry.messages.iter().filter(|m| m.is_visible(now)).count();

        Ok(QueueDepth {
            visible,
            in_flight: entry.messages.len() - visible,
        })
    }

    /// Bodies of every message held by the queue, in send order
    pub fn message_bodies(&self, queue: &QueueName) -> Result<Vec<String>, QueueError> {
        let storage = self.lock_storage()?;
        let entry = storage
            .queues
            .get(queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        Ok(entry.messages.iter().map(|m| m.body.clone()).collect())
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, QueueStorage>, QueueError> {
        self.storage.lock().map_err(|_| QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "StoragePoisoned".to_string(),
            message: "queue storage lock was poisoned by a panicking thread".to_string(),
        })
    }

    fn queue_url_for(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        let base = self.config.account_url.trim_end_matches('/');
        Ok(QueueUrl::new(format!("{}/{}", base, queue))?)
    }

    /// Find the queue addressed by a URL, creating it when auto-creation is enabled
    fn queue_for_url<'a>(
        &self,
        storage: &'a mut QueueStorage,
        queue_url: &QueueUrl,
    ) -> Result<&'a mut InMemoryQueue, QueueError> {
        let not_found = || QueueError::QueueNotFound {
            queue_name: queue_url.to_string(),
        };

        let name = queue_url.queue_name().map_err(|_| not_found())?;
        let expected_url = self.queue_url_for(&name)?;
        if &expected_url != queue_url {
            return Err(not_found());
        }

        if !storage.queues.contains_key(&name) {
            if !self.config.auto_create_queues {
                return Err(not_found());
            }
            debug!(queue = %name, "Auto-creating queue");
        }

        Ok(storage
            .queues
            .entry(name)
            .or_insert_with(|| InMemoryQueue::new(expected_url)))
    }

    fn visibility_window(&self, request: &ReceiveRequest) -> Duration {
        request
            .visibility_timeout
            .map(|t| t.as_duration())
            .unwrap_or_else(|| {
                Duration::from_secs(u64::from(self.config.default_visibility_timeout_seconds))
            })
    }

    /// Hand out up to `max` visible messages, or report when to look again
    fn take_visible(
        &self,
        queue_url: &QueueUrl,
        request: &ReceiveRequest,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let mut storage = self.lock_storage()?;
        let queue = self.queue_for_url(&mut storage, queue_url)?;

        let now = Instant::now();
        let window = self.visibility_window(request);
        let mut batch = Vec::new();

        for stored in queue.messages.iter_mut() {
            if batch.len() >= request.max_messages as usize {
                break;
            }
            if !stored.is_visible(now) {
                continue;
            }

            let receipt = uuid::Uuid::new_v4().to_string();
            stored.receive_count += 1;
            stored.visible_at = now + window;
            stored.receipt = Some(receipt.clone());

            batch.push(ReceivedMessage {
                message_id: stored.message_id.clone(),
                receipt_handle: ReceiptHandle::new(receipt)?,
                body: stored.body.clone(),
                attributes: stored.attributes.clone(),
                receive_count: stored.receive_count,
                message_group_id: stored.message_group_id.clone(),
            });
        }

        Ok((batch, queue.next_visibility_change(now)))
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueTransport for InMemoryProvider {
    async fn resolve_url(&self, queue: &QueueName) -> Result<QueueUrl, QueueError> {
        if self.config.auto_create_queues {
            return self.create_queue(queue);
        }

        let storage = self.lock_storage()?;
        storage
            .queues
            .get(queue)
            .map(|q| q.url.clone())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError> {
        let size = message.body.len()
            + message
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>();
        if size > self.config.max_message_size {
            return Err(QueueError::MessageTooLarge {
                size,
                max_size: self.config.max_message_size,
            });
        }

        let message_id = MessageId::new();
        {
            let mut storage = self.lock_storage()?;
            let queue = self.queue_for_url(&mut storage, queue_url)?;
            queue.messages.push(StoredMessage {
                message_id: message_id.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                message_group_id: message.message_group_id.clone(),
                receive_count: 0,
                visible_at: Instant::now(),
                receipt: None,
            });
        }

        self.arrivals.notify_waiters();
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let wait = request
            .wait_time
            .map(|w| w.as_duration())
            .unwrap_or_default();
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before inspecting the queue so a send racing
            // with this check still wakes us.
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let (batch, next_change) = self.take_visible(queue_url, request)?;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }

            let wake_at = next_change.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = arrival.as_mut() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
        timeout: VisibilityTimeout,
    ) -> Result<(), QueueError> {
        {
            let mut storage = self.lock_storage()?;
            let queue = self.queue_for_url(&mut storage, queue_url)?;
            let now = Instant::now();

            let stored = queue
                .messages
                .iter_mut()
                .find(|m| m.holds_receipt(receipt) && !m.is_visible(now))
                .ok_or_else(|| QueueError::ReceiptInvalid {
                    receipt: receipt.abbreviated(),
                })?;

            stored.visible_at = now + timeout.as_duration();
        }

        if timeout.as_secs() == 0 {
            self.arrivals.notify_waiters();
        }

        Ok(())
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.lock_storage()?;
        let queue = self.queue_for_url(&mut storage, queue_url)?;

        let position = queue
            .messages
            .iter()
            .position(|m| m.holds_receipt(receipt))
            .ok_or_else(|| QueueError::ReceiptInvalid {
                receipt: receipt.abbreviated(),
            })?;

        queue.messages.remove(position);
        Ok(())
    }

    async fn list_queue_urls(&self) -> Result<Vec<QueueUrl>, QueueError> {
        let storage = self.lock_storage()?;
        let mut names: Vec<&QueueName> = storage.queues.keys().collect();
        names.sort();

        Ok(names
            .into_iter()
            .filter_map(|name| storage.queues.get(name).map(|q| q.url.clone()))
            .collect())
    }

    async fn approximate_message_count(&self, queue_url: &QueueUrl) -> Result<u64, QueueError> {
        let mut storage = self.lock_storage()?;
        let queue = self.queue_for_url(&mut storage, queue_url)?;
        let now = Instant::now();

        Ok(queue.messages.iter().filter(|m| m.is_visible(now)).count() as u64)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
