//! Background drain task.
//!
//! Drains once at start, then on every interval tick and whenever the
//! trigger is notified (connectivity regained, app foregrounded, ...).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::submission::DurableSubmissionQueue;

/// Spawn the periodic drain task.
#[must_use]
pub fn spawn_drain_task(
    queue: Arc<DurableSubmissionQueue>,
    interval: Duration,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!("drain task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!("scheduled drain");
                    }
                    () = trigger.notified() => {
                        debug!("triggered drain");
                    }
                }

                if let Err(err) = queue.drain().await {
                    error!(%err, "drain failed, will retry");
                }
            }
        }
        .instrument(info_span!("drain_task")),
    )
}
