//! Keyed load coalescing with a freshness window and a timeout guard.
//!
//! [`LoadCoordinator::run`] registers a task for a key synchronously, before
//! the returned future is ever polled, so two calls made back to back with
//! the same key always observe the same task. The loader itself runs on a
//! spawned Tokio task: dropping every caller's future does not abort it.
//!
//! Each task owns a cleanup timer bound to a [`CancellationToken`]. The
//! timer removes the entry one freshness window after the load settles.
//! Replacing, cancelling, or clearing the entry cancels the timer, and
//! dropping the last coordinator handle cancels all of them.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::timeout::with_timeout;
use crate::config::LoadingConfig;
use crate::{AppError, Result};

/// Context label recorded when the caller does not supply one.
pub const DEFAULT_CONTEXT: &str = "unknown";

type ErasedValue = Arc<dyn Any + Send + Sync>;
type SharedOutcome = Shared<BoxFuture<'static, Result<ErasedValue>>>;

/// Bookkeeping for one logical load.
struct LoadTask {
    generation: u64,
    started_at: Instant,
    context: String,
    outcome: SharedOutcome,
    cleanup: CancellationToken,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<String, LoadTask>,
    next_generation: u64,
}

struct Inner {
    registry: Mutex<Registry>,
    freshness_window: Duration,
    load_timeout: Duration,
    root: CancellationToken,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, task: &LoadTask, now: Instant) -> bool {
        now.saturating_duration_since(task.started_at) < self.freshness_window
    }

    /// Remove `key` only if it still refers to the task that scheduled us.
    fn expire(&self, key: &str, generation: u64) {
        let mut registry = self.registry();
        if registry
            .tasks
            .get(key)
            .is_some_and(|task| task.generation == generation)
        {
            registry.tasks.remove(key);
            debug!(key, "load entry expired");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Diagnostic view of a single registered load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEntryStats {
    /// Load key.
    pub key: String,
    /// Caller-supplied diagnostic label.
    pub context: String,
    /// Time since the load started.
    pub age: Duration,
}

/// Diagnostic snapshot of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of registered entries, fresh or not yet expired.
    pub active_count: usize,
    /// Entries ordered by key.
    pub entries: Vec<LoadEntryStats>,
}

/// Deduplicates and time-bounds asynchronous loads keyed by string.
///
/// Cloning is cheap; clones share the same task registry.
#[derive(Clone)]
pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl Default for LoadCoordinator {
    fn default() -> Self {
        Self::with_config(&LoadingConfig::default())
    }
}

impl LoadCoordinator {
    /// Create a coordinator with explicit freshness window and load timeout.
    #[must_use]
    pub fn new(freshness_window: Duration, load_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                freshness_window,
                load_timeout,
                root: CancellationToken::new(),
            }),
        }
    }

    /// Create a coordinator from the `[loading]` configuration section.
    #[must_use]
    pub fn with_config(config: &LoadingConfig) -> Self {
        Self::new(config.freshness_window(), config.load_timeout())
    }

    /// Freshness window this coordinator was built with.
    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        self.inner.freshness_window
    }

    /// Load timeout this coordinator was built with.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        self.inner.load_timeout
    }

    /// Run `loader` for `key`, or join a load for `key` that is still fresh.
    ///
    /// Shorthand for [`run_with_context`](Self::run_with_context) with the
    /// default context label.
    pub fn run<T, F, Fut>(&self, key: &str, loader: F) -> BoxFuture<'static, Result<Arc<T>>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run_with_context(key, DEFAULT_CONTEXT, loader)
    }

    /// Run `loader` for `key`, or join a load for `key` that is still fresh.
    ///
    /// Registration happens before this method returns. Every caller that
    /// joins the same task receives the identical `Arc` on success, or a
    /// clone of the same error on failure. Must be called from within a
    /// Tokio runtime.
    ///
    /// `loader` is invoked only by the caller that registers the task, so
    /// racing callers on other threads never run it twice. A load that
    /// exceeds the timeout is dropped at its current await point rather
    /// than left running; loaders with side effects must tolerate being
    /// abandoned midway.
    ///
    /// # Errors
    ///
    /// The returned future yields:
    /// - the loader's own error, unchanged;
    /// - `AppError::Timeout` if the load exceeded the configured bound;
    /// - `AppError::TypeMismatch` if `key` is shared with a load of a
    ///   different result type;
    /// - `AppError::Validation` if `key` is empty.
    pub fn run_with_context<T, F, Fut>(
        &self,
        key: &str,
        context: &str,
        loader: F,
    ) -> BoxFuture<'static, Result<Arc<T>>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let outcome = self.acquire(key, context, loader);
        let key = key.to_owned();

        Box::pin(async move {
            let erased = outcome?.await?;
            erased.downcast::<T>().map_err(|_| {
                AppError::TypeMismatch(format!(
                    "load for key {key} produced a different result type"
                ))
            })
        })
    }

    /// Whether a load for `key` is registered and still inside its
    /// freshness window.
    #[must_use]
    pub fn is_loading(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .registry()
            .tasks
            .get(key)
            .is_some_and(|task| self.inner.is_fresh(task, now))
    }

    /// Forget the entry for `key`.
    ///
    /// An already-started loader keeps running; its outcome is still
    /// delivered to callers that joined it, but no new caller will.
    pub fn cancel(&self, key: &str) {
        let removed = self.inner.registry().tasks.remove(key);
        if let Some(task) = removed {
            task.cleanup.cancel();
            info!(key, context = %task.context, "load entry cancelled");
        }
    }

    /// Forget every entry.
    pub fn clear_all(&self) {
        let drained: Vec<LoadTask> = {
            let mut registry = self.inner.registry();
            registry.tasks.drain().map(|(_, task)| task).collect()
        };
        for task in &drained {
            task.cleanup.cancel();
        }
        info!(count = drained.len(), "cleared all load entries");
    }

    /// Snapshot of registered entries.
    #[must_use]
    pub fn stats(&self) -> LoadStats {
        let now = Instant::now();
        let mut entries: Vec<LoadEntryStats> = self
            .inner
            .registry()
            .tasks
            .iter()
            .map(|(key, task)| LoadEntryStats {
                key: key.clone(),
                context: task.context.clone(),
                age: now.saturating_duration_since(task.started_at),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        LoadStats {
            active_count: entries.len(),
            entries,
        }
    }

    /// Return the shared outcome for `key`, starting a new load if needed.
    fn acquire<T, F, Fut>(&self, key: &str, context: &str, loader: F) -> Result<SharedOutcome>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(AppError::Validation("load key must not be empty".into()));
        }

        if let Some(outcome) = self.fresh_outcome(key) {
            return Ok(outcome);
        }

        let mut registry = self.inner.registry();

        let now = Instant::now();
        if let Some(task) = registry.tasks.get(key) {
            if self.inner.is_fresh(task, now) {
                debug!(key, "another caller registered first, joining its load");
                return Ok(task.outcome.clone());
            }
        }

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let cleanup = self.inner.root.child_token();
        let (tx, rx) = oneshot::channel::<Result<ErasedValue>>();
        let cancelled_key = key.to_owned();
        let outcome: SharedOutcome = async move {
            rx.await.unwrap_or_else(|_| {
                Err(AppError::Cancelled(format!(
                    "load for key {cancelled_key} stopped before settling"
                )))
            })
        }
        .boxed()
        .shared();

        let previous = registry.tasks.insert(
            key.to_owned(),
            LoadTask {
                generation,
                started_at: now,
                context: context.to_owned(),
                outcome: outcome.clone(),
                cleanup: cleanup.clone(),
            },
        );
        drop(registry);

        if let Some(stale) = previous {
            stale.cleanup.cancel();
            debug!(key, "superseded stale load entry");
        }

        // The entry is registered, so concurrent callers join it. The loader
        // is invoked outside the lock so one that calls back into the
        // coordinator cannot deadlock.
        let bound = self.inner.load_timeout;
        let owned_key = key.to_owned();
        let load = loader();
        let guarded = async move { with_timeout(load, bound, &owned_key).await };
        self.spawn_driver(key, generation, guarded, tx, cleanup);

        info!(key, context, "starting load");
        Ok(outcome)
    }

    fn fresh_outcome(&self, key: &str) -> Option<SharedOutcome> {
        let now = Instant::now();
        let registry = self.inner.registry();
        let task = registry.tasks.get(key)?;
        if self.inner.is_fresh(task, now) {
            debug!(key, context = %task.context, "reusing in-flight load");
            Some(task.outcome.clone())
        } else {
            None
        }
    }

    /// Drive the load to settlement, publish it, then run the cleanup timer.
    fn spawn_driver<T, G>(
        &self,
        key: &str,
        generation: u64,
        guarded: G,
        tx: oneshot::Sender<Result<ErasedValue>>,
        cleanup: CancellationToken,
    ) where
        T: Send + Sync + 'static,
        G: Future<Output = Result<T>> + Send + 'static,
    {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let window = self.inner.freshness_window;
        let task_key = key.to_owned();

        tokio::spawn(
            async move {
                // A panicking loader surfaces as an error instead of a
                // dropped sender.
                let outcome = match tokio::spawn(guarded).await {
                    Ok(Ok(value)) => {
                        debug!(key = %task_key, "load completed");
                        Ok(Arc::new(value) as ErasedValue)
                    }
                    Ok(Err(err)) => {
                        warn!(key = %task_key, %err, "load failed");
                        Err(err)
                    }
                    Err(join_err) => {
                        warn!(key = %task_key, %join_err, "loader task aborted");
                        Err(AppError::Loader(format!(
                            "loader for key {task_key} aborted: {join_err}"
                        )))
                    }
                };

                let _ = tx.send(outcome);

                tokio::select! {
                    () = cleanup.cancelled() => {}
                    () = tokio::time::sleep(window) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.expire(&task_key, generation);
                        }
                    }
                }
            }
            .instrument(info_span!("load", key = %key)),
        );
    }
}
