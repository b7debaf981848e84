//! Offline-durable submission of feedback items.

pub mod codec;
pub mod scheduler;
pub mod submission;

pub use scheduler::spawn_drain_task;
pub use submission::{DrainReport, DurableSubmissionQueue};
