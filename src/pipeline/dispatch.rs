//! Bounded dispatch: one spawned execution per discovered path, capped by a
//! permit pool.
//!
//! ## Why acquire before spawning?
//!
//! Acquiring the permit in the dispatch loop (rather than inside the spawned
//! task) means the loop itself stops pulling paths once `max_concurrent`
//! executions are in flight. The walker, parked on its capacity-1 hand-off,
//! stops too. Nothing is buffered beyond one path, so memory stays flat on
//! trees with millions of files.
//!
//! ## Draining
//!
//! After the walk terminates (normally, with an error, or by cancellation)
//! the dispatcher acquires every permit of the guard. That only succeeds once
//! all spawned executions have released theirs, so a walk failure is never
//! reported while work is still running.

use crate::error::{BatchError, DiscoveryError, ItemError};
use crate::output::{ItemStats, WorkOutcome};
use crate::pipeline::discover::PathSource;
use crate::pipeline::PipelineState;
use crate::progress::ProgressCallback;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The unit of work performed for one discovered path.
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// concurrent execution and must treat its own state as read-only.
/// Closures `Fn(PathBuf) -> impl Future<Output = Result<ItemStats, ItemError>>`
/// implement this trait, which keeps tests and ad-hoc pipelines short.
pub trait WorkItemProcessor: Send + Sync {
    /// Process one path. Errors are per-item and never abort siblings.
    fn process(&self, path: PathBuf)
        -> impl Future<Output = Result<ItemStats, ItemError>> + Send;
}

impl<F, Fut> WorkItemProcessor for F
where
    F: Fn(PathBuf) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ItemStats, ItemError>> + Send,
{
    fn process(&self, path: PathBuf) -> impl Future<Output = Result<ItemStats, ItemError>> + Send {
        self(path)
    }
}

/// Largest usable pool size. Draining acquires every permit in one
/// `acquire_many(u32)` call, so the pool never exceeds `u32::MAX`.
pub const MAX_CONCURRENCY: usize = if (u32::MAX as usize) < Semaphore::MAX_PERMITS {
    u32::MAX as usize
} else {
    Semaphore::MAX_PERMITS
};

/// Fixed-capacity permit pool bounding simultaneous executions.
///
/// Permits are released when the returned [`OwnedSemaphorePermit`] is
/// dropped, which covers normal return, early return and unwinding alike.
/// The pool is never closed; the error paths below only surface a broken
/// semaphore as [`BatchError::Internal`].
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGuard {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free permit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, BatchError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| BatchError::Internal(format!("permit pool: {e}")))
    }

    /// Wait until every permit is back, i.e. nothing is in flight.
    pub async fn wait_idle(&self) -> Result<(), BatchError> {
        let all = u32::try_from(self.capacity)
            .map_err(|_| BatchError::Internal(format!("pool of {} permits", self.capacity)))?;
        let _all = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|e| BatchError::Internal(format!("permit pool: {e}")))?;
        Ok(())
    }
}

/// What the dispatcher did, returned once every execution has drained.
#[derive(Debug)]
pub struct DispatchReport {
    /// Executions spawned; the aggregator must collect exactly this many outcomes.
    pub spawned: usize,
    /// Terminal walk signal.
    pub walk: Result<usize, DiscoveryError>,
    /// Dispatch-side failure, if the loop could not continue.
    pub fault: Option<BatchError>,
}

/// Consumes a [`PathSource`] and fans out executions of a [`WorkItemProcessor`].
pub struct Dispatcher<P> {
    processor: Arc<P>,
    guard: ConcurrencyGuard,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl<P> Dispatcher<P>
where
    P: WorkItemProcessor + 'static,
{
    pub fn new(processor: Arc<P>, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            processor,
            guard: ConcurrencyGuard::new(max_concurrent),
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the dispatch loop to completion.
    ///
    /// Every spawned execution sends exactly one [`WorkOutcome`] on
    /// `outcomes`. The channel closes once the last execution finishes, which
    /// is how the aggregator learns that fan-in is complete.
    pub async fn run(
        self,
        mut source: PathSource,
        outcomes: mpsc::Sender<WorkOutcome>,
    ) -> DispatchReport {
        let mut spawned = 0usize;
        let mut fault = None;
        let mut cancelled = false;
        self.notify_state(PipelineState::Running);

        loop {
            let path = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Cancellation requested; no further paths will be dispatched");
                    cancelled = true;
                    break;
                }
                next = source.next() => match next {
                    Some(path) => path,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Cancelled before dispatching {}", path.display());
                    cancelled = true;
                    break;
                }
                permit = self.guard.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        fault = Some(e);
                        self.cancel.cancel();
                        break;
                    }
                },
            };

            spawned += 1;
            if let Some(ref cb) = self.progress {
                cb.on_item_start(&path, spawned);
            }
            debug!("Dispatching #{}: {}", spawned, path.display());
            self.spawn_one(path, permit, outcomes.clone());
        }

        // Stop the walker first so it reports promptly, then drain.
        source.close();
        let mut walk = source.finish().await;
        // The walker may have finished with paths still buffered or held
        // here; those were never dispatched, so the walk did not complete.
        if cancelled && walk.is_ok() {
            walk = Err(DiscoveryError::Canceled);
        }
        if let Err(ref e) = walk {
            warn!("Walk terminated: {}", e);
        }

        self.notify_state(PipelineState::Draining);
        if let Err(e) = self.guard.wait_idle().await {
            fault.get_or_insert(e);
        }
        info!("Dispatch complete: {} executions drained", spawned);

        DispatchReport {
            spawned,
            walk,
            fault,
        }
    }

    fn spawn_one(
        &self,
        path: PathBuf,
        permit: OwnedSemaphorePermit,
        outcomes: mpsc::Sender<WorkOutcome>,
    ) {
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let start = Instant::now();
            let result = AssertUnwindSafe(processor.process(path.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ItemError::Panicked {
                        detail: panic_message(panic.as_ref()),
                    })
                });
            let elapsed = start.elapsed();
            drop(permit);

            let outcome = match result {
                Ok(stats) => WorkOutcome::Success {
                    path,
                    stats,
                    elapsed,
                },
                Err(error) => WorkOutcome::Failure {
                    path,
                    error,
                    elapsed,
                },
            };
            if outcomes.send(outcome).await.is_err() {
                warn!("Outcome receiver dropped; result discarded");
            }
        });
    }

    fn notify_state(&self, state: PipelineState) {
        debug!("Pipeline state: {:?}", state);
        if let Some(ref cb) = self.progress {
            cb.on_state_change(state);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
