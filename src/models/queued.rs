//! Queue envelope around a feedback payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::feedback::FeedbackReport;
use crate::Result;

/// A feedback item travelling through the durable submission queue.
///
/// `id` is generated once and reused on every retry, so the remote sink can
/// use it as an idempotency key. `payload` is opaque to the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedFeedbackItem {
    /// Stable identifier across retries.
    pub id: String,
    /// Domain content, forwarded untouched.
    pub payload: Value,
    /// Set once the item has been persisted after a failed live submission.
    #[serde(default)]
    pub offline_flag: bool,
}

impl QueuedFeedbackItem {
    /// Wrap an arbitrary payload under a caller-chosen id.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            offline_flag: false,
        }
    }

    /// Validate `report` and wrap it under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the report is incomplete, or
    /// `AppError::Serialization` if it cannot be converted to JSON.
    pub fn from_report(report: &FeedbackReport) -> Result<Self> {
        report.validate()?;
        let payload = serde_json::to_value(report)?;
        Ok(Self::new(Uuid::new_v4().to_string(), payload))
    }
}
