//! Request coalescing for asynchronous loads.
//!
//! Callers that ask for the same key inside the freshness window share one
//! in-flight load instead of each issuing their own.

pub mod coordinator;
pub mod timeout;

pub use coordinator::{LoadCoordinator, LoadEntryStats, LoadStats};
