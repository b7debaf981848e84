//! Race-against-timer guard for loads.

use std::future::Future;
use std::time::Duration;

use crate::{AppError, Result};

/// Await `future`, failing with `AppError::Timeout` once `bound` elapses.
///
/// The timeout message names `key` so every coalesced caller can tell which
/// load gave up. On timeout the inner future is dropped.
///
/// # Errors
///
/// Returns whatever `future` returns, or `AppError::Timeout`.
pub async fn with_timeout<T, F>(future: F, bound: Duration, key: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(bound, future).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AppError::Timeout(format!(
            "load exceeded {}ms for key: {key}",
            bound.as_millis()
        ))),
    }
}
