//! Outcome and result types produced by a batch run.

use crate::error::{BatchError, ItemError};
use crate::pipeline::Phase;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Metadata returned by a successful unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStats {
    /// Page count of the input document, when it could be determined.
    pub pages: Option<usize>,
    /// Artifact written for this input, if any.
    pub output: Option<PathBuf>,
}

/// The tagged result of processing one path. Exactly one is produced per
/// dispatched path.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Success {
        path: PathBuf,
        stats: ItemStats,
        elapsed: Duration,
    },
    Failure {
        path: PathBuf,
        error: ItemError,
        elapsed: Duration,
    },
}

impl WorkOutcome {
    pub fn path(&self) -> &Path {
        match self {
            WorkOutcome::Success { path, .. } | WorkOutcome::Failure { path, .. } => path,
        }
    }

    /// Wall-clock time spent in the unit of work.
    pub fn elapsed(&self) -> Duration {
        match self {
            WorkOutcome::Success { elapsed, .. } | WorkOutcome::Failure { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Success { .. })
    }
}

/// One per-item failure, enumerated in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub error: ItemError,
}

/// Final aggregate of a pipeline run.
///
/// Mutated only by the aggregator; observable only after every dispatched
/// execution has reported.
#[derive(Debug, Default)]
pub struct PipelineResult {
    /// Outcomes collected (successes + failures).
    pub attempted: usize,
    /// Successful outcomes.
    pub succeeded: usize,
    /// Sum of page counts over successful outcomes that reported one.
    pub total_pages: usize,
    /// Sum of per-item processing time over successful outcomes.
    pub processing_time: Duration,
    /// End-to-end wall-clock time of the run.
    pub wall_time: Duration,
    /// Per-item failures, in completion order.
    pub failures: Vec<ItemFailure>,
    /// The first fatal condition, if any.
    pub fatal: Option<BatchError>,
}

impl PipelineResult {
    /// Number of per-item failures.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// No fatal condition occurred. Per-item failures are allowed.
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }

    /// Pages per second of wall-clock time.
    pub fn pages_per_wall_second(&self) -> f64 {
        rate(self.total_pages, self.wall_time)
    }

    /// Pages per second of summed processing time.
    pub fn pages_per_processing_second(&self) -> f64 {
        rate(self.total_pages, self.processing_time)
    }

    /// Split off the fatal condition, if any.
    pub fn into_result(mut self) -> Result<Self, BatchError> {
        match self.fatal.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// A serialisable view of this result.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed(),
            total_pages: self.total_pages,
            processing_time_ms: self.processing_time.as_millis() as u64,
            wall_time_ms: self.wall_time.as_millis() as u64,
            failures: self.failures.clone(),
            fatal: self.fatal.as_ref().map(|e| FatalReport {
                phase: e.phase(),
                cancelled: e.is_cancellation(),
                message: e.to_string(),
            }),
        }
    }
}

fn rate(pages: usize, time: Duration) -> f64 {
    let secs = time.as_secs_f64();
    if secs > 0.0 {
        pages as f64 / secs
    } else {
        0.0
    }
}

/// JSON-friendly summary of a [`PipelineResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_pages: usize,
    pub processing_time_ms: u64,
    pub wall_time_ms: u64,
    pub failures: Vec<ItemFailure>,
    pub fatal: Option<FatalReport>,
}

/// Description of the fatal condition that ended a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatalReport {
    pub phase: Option<Phase>,
    pub cancelled: bool,
    pub message: String,
}
