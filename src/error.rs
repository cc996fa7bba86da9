//! Error types for the batchfish library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`BatchError`]: **Fatal**: the batch cannot proceed or must stop
//!   dispatching (bad configuration, unreadable query, directory walk failed).
//!   Configuration errors are returned as `Err(BatchError)` from
//!   [`crate::batch::run_batch`]; runtime fatal errors are recorded in
//!   [`crate::output::PipelineResult::fatal`] after in-flight work has drained.
//!
//! * [`DiscoveryError`]: the terminal signal of the directory walk. Delivered
//!   exactly once; wrapped into [`BatchError::Discovery`] when it is not `Ok`.
//!
//! * [`ItemError`]: **Non-fatal**: one file failed (request error, bad
//!   status, malformed response, write failure) but its siblings are
//!   unaffected. Stored in [`crate::output::ItemFailure`] so callers can
//!   inspect partial success rather than losing the whole batch to one file.

use crate::pipeline::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the batchfish library.
///
/// Per-file failures use [`ItemError`] and never appear here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The query payload file could not be read.
    #[error("Failed to read query payload '{path}': {source}")]
    QueryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory does not exist and could not be created.
    #[error("Output directory '{path}' is unavailable: {source}")]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Runtime errors ────────────────────────────────────────────────────
    /// The directory walk ended with a failure or was cancelled.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The dispatcher task itself died.
    #[error("Dispatcher task failed: {0}")]
    DispatcherFailed(String),

    /// Fan-in did not match fan-out.
    #[error("Collected {collected} outcomes but {spawned} executions were spawned")]
    OutcomeCountMismatch { spawned: usize, collected: usize },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// The pipeline phase this error occurred in; `None` for setup errors.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BatchError::Discovery(_) => Some(Phase::Discovery),
            BatchError::DispatcherFailed(_) => Some(Phase::Dispatch),
            BatchError::OutcomeCountMismatch { .. } => Some(Phase::Drain),
            BatchError::InvalidConfig(_)
            | BatchError::QueryUnreadable { .. }
            | BatchError::OutputDirUnavailable { .. }
            | BatchError::HttpClient(_)
            | BatchError::Internal(_) => None,
        }
    }

    /// True when the walk stopped because cancellation was requested.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BatchError::Discovery(DiscoveryError::Canceled))
    }
}

/// Terminal signal of a directory walk that did not complete.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Cancellation was observed at a yield point.
    #[error("walk canceled")]
    Canceled,

    /// The traversal hit an I/O or permission error.
    #[error("walk failed at {}: {source}", display_path(.path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// The blocking walker thread panicked.
    #[error("walker thread panicked: {0}")]
    WalkerPanicked(String),
}

impl From<walkdir::Error> for DiscoveryError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from);
        DiscoveryError::Io {
            path,
            source: err.into(),
        }
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!("'{}'", p.display()),
        None => "<unknown path>".to_string(),
    }
}

/// A non-fatal error for a single file.
///
/// Recorded against that file only; sibling executions keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The input file could not be read.
    #[error("cannot read input '{path}': {detail}")]
    ReadInput { path: PathBuf, detail: String },

    /// The request could not be sent or the response body could not be read.
    #[error("request failed: {detail}")]
    Request { detail: String },

    /// The remote call exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The remote service answered with a non-success status.
    #[error("bad status: {status} {reason}")]
    BadStatus { status: u16, reason: String },

    /// The response body is not a valid JSON document.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// Could not create or write the output artifact.
    #[error("failed to write output '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    /// Any other failure reported by a custom processor.
    #[error("{0}")]
    Processing(String),

    /// The unit of work panicked.
    #[error("unit of work panicked: {detail}")]
    Panicked { detail: String },
}
