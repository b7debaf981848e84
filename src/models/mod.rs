//! Domain model module declarations.

pub mod feedback;
pub mod queued;

pub use feedback::{DeviceInfo, FeedbackCategory, FeedbackReport, Reporter};
pub use queued::QueuedFeedbackItem;
