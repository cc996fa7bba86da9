//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline dispatches and completes each file.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a broadcast channel, a log sink, or a terminal progress
//! bar without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use batchfish::{BatchConfig, BatchProgressCallback, ItemStats};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use std::time::Duration;
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, path: &Path, _stats: &ItemStats, elapsed: Duration) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{done} {} in {:?}", path.display(), elapsed);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ItemError;
use crate::output::ItemStats;
use crate::pipeline::PipelineState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Threading
///
/// `on_state_change` and `on_item_start` are called from the dispatcher task;
/// `on_item_complete`, `on_item_error` and `on_batch_complete` from the
/// aggregator. The two run concurrently, so shared mutable state needs
/// synchronisation.
pub trait BatchProgressCallback: Send + Sync {
    /// The pipeline moved to a new lifecycle state.
    fn on_state_change(&self, state: PipelineState) {
        let _ = state;
    }

    /// A file was handed to a worker.
    ///
    /// # Arguments
    /// * `path`: the discovered file
    /// * `dispatched`: executions spawned so far, including this one
    fn on_item_start(&self, path: &Path, dispatched: usize) {
        let _ = (path, dispatched);
    }

    /// A file was processed successfully.
    fn on_item_complete(&self, path: &Path, stats: &ItemStats, elapsed: Duration) {
        let _ = (path, stats, elapsed);
    }

    /// A file failed. The batch continues.
    fn on_item_error(&self, path: &Path, error: &ItemError) {
        let _ = (path, error);
    }

    /// Called once after every dispatched file has reported.
    fn on_batch_complete(&self, attempted: usize, succeeded: usize) {
        let _ = (attempted, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
