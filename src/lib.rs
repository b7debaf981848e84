#![forbid(unsafe_code)]

//! Loading coordination and offline-durable feedback submission for the
//! coffee tasting journal.

pub mod config;
pub mod errors;
pub mod loading;
pub mod models;
pub mod persistence;
pub mod queue;
pub mod sink;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use loading::LoadCoordinator;
pub use queue::DurableSubmissionQueue;
