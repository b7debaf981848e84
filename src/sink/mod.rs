//! Remote submission sinks.
//!
//! The [`FeedbackSink`] trait is the queue's only view of the backend.
//! A sink must treat `item.id` as an idempotency key: the queue delivers
//! at least once and may resend an item whose acceptance was never
//! confirmed.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use crate::models::QueuedFeedbackItem;
use crate::{AppError, Result};

pub use http::HttpSink;

/// Boxed future returned by [`FeedbackSink::send`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Destination for feedback items.
pub trait FeedbackSink: Send + Sync {
    /// Deliver one item.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`] on any rejection: transport, validation,
    /// or authorization.
    fn send<'a>(&'a self, item: &'a QueuedFeedbackItem) -> SinkFuture<'a>;
}

/// Sink used when no backend is configured. Every send fails, so every
/// submission lands in durable storage until a real sink is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSink;

impl FeedbackSink for OfflineSink {
    fn send<'a>(&'a self, item: &'a QueuedFeedbackItem) -> SinkFuture<'a> {
        Box::pin(async move {
            Err(AppError::Network(format!(
                "no sink configured, item {} not sent",
                item.id
            )))
        })
    }
}
