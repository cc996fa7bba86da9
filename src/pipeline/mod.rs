//! Pipeline stages for batch submission.
//!
//! Each submodule implements exactly one component. Keeping them separate
//! makes each independently testable and lets callers swap the unit of work
//! (the HTTP call) without touching discovery or dispatch.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ dispatch ──▶ remote (N concurrent) ──▶ aggregate
//!  (walkdir)   (semaphore)   (multipart POST)         (PipelineResult)
//!      ▲            │
//!      └── cancel ──┘
//! ```
//!
//! 1. [`discover`]: walk the input root on a blocking thread and yield
//!    regular files one at a time through a capacity-1 channel
//! 2. [`dispatch`]: acquire a permit per path, spawn the unit of work,
//!    drain every in-flight execution before reporting
//! 3. [`remote`]: the concrete unit of work; the only stage with network I/O
//! 4. [`pages`]: page counting for throughput statistics
//! 5. [`aggregate`]: fold outcomes, in completion order, into a [`crate::output::PipelineResult`]

pub mod aggregate;
pub mod discover;
pub mod dispatch;
pub mod pages;
pub mod remote;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the pipeline in which a fatal condition occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Walking the input tree.
    Discovery,
    /// Acquiring permits and spawning executions.
    Dispatch,
    /// Waiting for in-flight executions after dispatch stopped.
    Drain,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Dispatch => "dispatch",
            Phase::Drain => "drain",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one pipeline run.
///
/// `Idle → Running → Draining → Finalized`. Cancellation moves `Running`
/// towards `Draining`; `Draining` is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    /// Walking and dispatching concurrently.
    Running,
    Draining,
    Finalized,
}
