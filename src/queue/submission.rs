//! Durable, retryable submission queue for feedback items.
//!
//! A live submission is attempted once. If the sink rejects it, the item is
//! appended to the persisted list and the original error is returned, so
//! the caller can report "saved, will sync" instead of success. A later
//! [`drain`](DurableSubmissionQueue::drain) resends every persisted item
//! and deletes only the ones the sink accepted.
//!
//! Every read-modify-write of the persisted list runs under one in-process
//! lock. Drains are serialized by a second lock and only hold the storage
//! lock while reading and writing back, never across sink calls.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::codec;
use crate::models::QueuedFeedbackItem;
use crate::persistence::KeyValueStore;
use crate::sink::FeedbackSink;
use crate::Result;

/// Outcome counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items read from storage and offered to the sink.
    pub attempted: usize,
    /// Items the sink accepted and that were removed from storage.
    pub delivered: usize,
    /// Items left in storage after write-back.
    pub remaining: usize,
}

/// Submission queue backed by durable key-value storage.
pub struct DurableSubmissionQueue {
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn FeedbackSink>,
    storage_key: String,
    storage_lock: Mutex<()>,
    drain_lock: Mutex<()>,
}

impl DurableSubmissionQueue {
    /// Create a queue persisting under `storage_key`.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn FeedbackSink>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sink,
            storage_key: storage_key.into(),
            storage_lock: Mutex::new(()),
            drain_lock: Mutex::new(()),
        }
    }

    /// Storage key holding the persisted list.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Send `item` to the sink, persisting it on failure.
    ///
    /// # Errors
    ///
    /// Returns the sink's error after the item has been persisted. If the
    /// item could not be persisted either, returns the storage or
    /// serialization error instead, and the item is not queued.
    pub async fn submit(&self, item: QueuedFeedbackItem) -> Result<()> {
        match self.sink.send(&item).await {
            Ok(()) => {
                info!(item_id = %item.id, "feedback submitted");
                Ok(())
            }
            Err(send_err) => {
                warn!(item_id = %item.id, %send_err, "live submission failed, queueing for retry");
                let item_id = item.id.clone();
                if let Err(persist_err) = self.enqueue_persisted(item).await {
                    error!(%item_id, %persist_err, "failed to queue feedback item");
                    return Err(persist_err);
                }
                Err(send_err)
            }
        }
    }

    /// Mark `item` offline and append it to the persisted list.
    ///
    /// An entry with the same id is replaced, never duplicated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` or `AppError::Serialization` if the
    /// persisted list cannot be read or written. A list that cannot be
    /// decoded is left untouched.
    pub async fn enqueue_persisted(&self, mut item: QueuedFeedbackItem) -> Result<()> {
        item.offline_flag = true;

        let _guard = self.storage_lock.lock().await;
        let mut items = self.read_list().await?;

        if let Some(existing) = items.iter_mut().find(|queued| queued.id == item.id) {
            debug!(item_id = %item.id, "replacing queued item with same id");
            *existing = item;
        } else {
            debug!(item_id = %item.id, "appending item to queue");
            items.push(item);
        }

        self.write_list(&items).await?;
        info!(queued = items.len(), "feedback item queued");
        Ok(())
    }

    /// Snapshot of the persisted list. A missing entry reads as empty.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` or `AppError::Serialization` if the
    /// list cannot be read.
    pub async fn pending(&self) -> Result<Vec<QueuedFeedbackItem>> {
        let _guard = self.storage_lock.lock().await;
        self.read_list().await
    }

    /// Resend every persisted item, keeping only those that still fail.
    ///
    /// One item failing does not stop the others. A drain started while
    /// another is running waits for it and then drains whatever is
    /// persisted at that point. When every item is delivered the storage
    /// entry is removed rather than left as an empty list.
    ///
    /// An unreadable list is logged and treated as nothing to drain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` or `AppError::Serialization` only if the
    /// write-back fails; delivered items stay persisted and will be resent.
    pub async fn drain(&self) -> Result<DrainReport> {
        let _drain = self.drain_lock.lock().await;

        let snapshot = {
            let _guard = self.storage_lock.lock().await;
            match self.read_list().await {
                Ok(items) => items,
                Err(err) => {
                    warn!(%err, "could not read queued feedback, nothing to drain");
                    return Ok(DrainReport::default());
                }
            }
        };

        if snapshot.is_empty() {
            debug!("feedback queue empty");
            return Ok(DrainReport::default());
        }

        let mut delivered: HashSet<String> = HashSet::new();
        for item in &snapshot {
            match self.sink.send(item).await {
                Ok(()) => {
                    debug!(item_id = %item.id, "queued item delivered");
                    delivered.insert(item.id.clone());
                }
                Err(err) => {
                    warn!(item_id = %item.id, %err, "queued item still failing");
                }
            }
        }

        let remaining = if delivered.is_empty() {
            snapshot.len()
        } else {
            // Re-read so items queued by a submit during the sends survive.
            let _guard = self.storage_lock.lock().await;
            let kept: Vec<QueuedFeedbackItem> = self
                .read_list()
                .await?
                .into_iter()
                .filter(|item| !delivered.contains(&item.id))
                .collect();
            self.write_list(&kept).await?;
            kept.len()
        };

        let report = DrainReport {
            attempted: snapshot.len(),
            delivered: delivered.len(),
            remaining,
        };
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            remaining = report.remaining,
            "feedback queue drained"
        );
        Ok(report)
    }

    async fn read_list(&self) -> Result<Vec<QueuedFeedbackItem>> {
        match self.store.get(&self.storage_key).await? {
            Some(raw) => codec::decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn write_list(&self, items: &[QueuedFeedbackItem]) -> Result<()> {
        if items.is_empty() {
            self.store.remove(&self.storage_key).await
        } else {
            let raw = codec::encode(items)?;
            self.store.set(&self.storage_key, &raw).await
        }
    }
}
