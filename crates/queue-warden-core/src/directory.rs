//! Cached registry of known queue names.
//!
//! The directory is populated explicitly, either by [`QueueDirectory::refresh`]
//! against a transport or by constructing it with known names. It never calls
//! the transport on its own, so validity checks before the first population
//! find nothing valid.

use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use queue_warden_runtime::{QueueName, QueueTransport};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;

#[derive(Debug, Clone, Default)]
struct DirectorySnapshot {
    names: BTreeSet<QueueName>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Read-mostly set of queue names that operations are allowed to target
///
/// Readers take a shared reference to the current snapshot, so checks running
/// concurrently with a refresh see either the old or the new set in full.
#[derive(Debug, Default)]
pub struct QueueDirectory {
    snapshot: RwLock<Arc<DirectorySnapshot>>,
}

impl QueueDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with known names
    pub fn with_names(names: impl IntoIterator<Item = QueueName>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(DirectorySnapshot {
                names: names.into_iter().collect(),
                refreshed_at: None,
            })),
        }
    }

    /// Replace the known names with the queues the transport lists
    ///
    /// On failure the previous names are kept and the error is returned.
    pub async fn refresh(
        &self,
        transport: &dyn QueueTransport,
    ) -> Result<Vec<QueueName>, LifecycleError> {
        let urls = transport.list_queue_urls().await.map_err(|e| {
            warn!(error = %e, "Queue directory refresh failed, keeping previous snapshot");
            e
        })?;

        let mut names = BTreeSet::new();
        for url in &urls {
            match url.queue_name() {
                Ok(name) => {
                    names.insert(name);
                }
                Err(e) => warn!(url = %url, error = %e, "Ignoring listed queue with unusable name"),
            }
        }

        let listed: Vec<QueueName> = names.iter().cloned().collect();
        self.replace(DirectorySnapshot {
            names,
            refreshed_at: Some(Utc::now()),
        });

        info!(queue_count = listed.len(), "Queue directory refreshed");
        Ok(listed)
    }

    /// Add a single name without listing, e.g. after the host created the queue
    pub fn register(&self, name: QueueName) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        if !guard.names.contains(&name) {
            debug!(queue = %name, "Registering queue in directory");
            Arc::make_mut(&mut guard).names.insert(name);
        }
    }

    /// Check whether a name is known
    ///
    /// Empty, whitespace-only and malformed names are never valid.
    pub fn is_valid(&self, name: &str) -> bool {
        if name.trim().is_empty() {
            return false;
        }

        match QueueName::new(name.to_string()) {
            Ok(queue) => self.current().names.contains(&queue),
            Err(_) => false,
        }
    }

    /// Check an optional name; `None` is invalid
    pub fn is_valid_opt(&self, name: Option<&str>) -> bool {
        name.is_some_and(|n| self.is_valid(n))
    }

    /// Check a name and return it typed, or fail with `InvalidQueue`
    pub fn validate(&self, name: &str) -> Result<QueueName, LifecycleError> {
        let invalid = || LifecycleError::InvalidQueue {
            queue_name: name.to_string(),
        };

        if !self.is_valid(name) {
            return Err(invalid());
        }
        QueueName::new(name.to_string()).map_err(|_| invalid())
    }

    /// Known names in sorted order
    pub fn known_names(&self) -> Vec<QueueName> {
        self.current().names.iter().cloned().collect()
    }

    /// Time of the last successful refresh, if any
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.current().refreshed_at
    }

    /// Number of known names
    pub fn len(&self) -> usize {
        self.current().names.len()
    }

    /// Check if no names are known
    pub fn is_empty(&self) -> bool {
        self.current().names.is_empty()
    }

    fn current(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn replace(&self, snapshot: DirectorySnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }
}
