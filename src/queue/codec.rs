//! Encoding of the persisted queue.
//!
//! The queue is stored as a single JSON array of
//! [`QueuedFeedbackItem`](crate::models::QueuedFeedbackItem) under one
//! storage key.

use crate::models::QueuedFeedbackItem;
use crate::{AppError, Result};

/// Encode the queue as a JSON array.
///
/// # Errors
///
/// Returns `AppError::Serialization` if a payload cannot be encoded.
pub fn encode(items: &[QueuedFeedbackItem]) -> Result<String> {
    serde_json::to_string(items)
        .map_err(|err| AppError::Serialization(format!("failed to encode queue: {err}")))
}

/// Decode a JSON array produced by [`encode`].
///
/// # Errors
///
/// Returns `AppError::Serialization` if `raw` is not a valid queue.
pub fn decode(raw: &str) -> Result<Vec<QueuedFeedbackItem>> {
    serde_json::from_str(raw)
        .map_err(|err| AppError::Serialization(format!("failed to decode queue: {err}")))
}
