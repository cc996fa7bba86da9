//! # batchfish
//!
//! Batch-submit a directory tree of documents to a remote processing service
//! and persist one JSON artifact per file.
//!
//! ## Why this crate?
//!
//! Services such as entity-fishing/NERD process one document per request.
//! Feeding them a corpus of thousands of PDFs is a concurrency problem, not a
//! parsing one: the batch must keep the service busy without flooding it,
//! survive individual bad files, and never report success or failure while
//! requests are still in flight. This crate packages that pipeline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input root
//!  │
//!  ├─ 1. Discover  walk the tree lazily (walkdir, spawn_blocking)
//!  ├─ 2. Dispatch  one task per file, capped by a semaphore
//!  ├─ 3. Submit    multipart POST {file, query} to the endpoint
//!  ├─ 4. Persist   <output_dir>/<stem>.json, written atomically
//!  └─ 5. Aggregate successes, pages, per-file failures, first fatal error
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchfish::{run_batch, BatchConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .input_root("in/")
//!         .output_dir("out/")
//!         .query_path("query.json")
//!         .max_concurrent(10)
//!         .build()?;
//!     let result = run_batch(&config, CancellationToken::new()).await?;
//!     eprintln!("{}/{} files, {} pages",
//!         result.succeeded, result.attempted, result.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom units of work
//!
//! [`run_pipeline`] accepts any [`WorkItemProcessor`], including plain
//! closures returning a future:
//!
//! ```rust,no_run
//! use batchfish::{run_pipeline, BatchConfig, ItemStats, ItemError};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let config = BatchConfig::builder().input_root("in/").build().unwrap();
//! let checksum = Arc::new(|path: PathBuf| async move {
//!     let bytes = tokio::fs::read(&path)
//!         .await
//!         .map_err(|e| ItemError::Processing(e.to_string()))?;
//!     println!("{} {}", path.display(), bytes.len());
//!     Ok::<_, ItemError>(ItemStats::default())
//! });
//! let result = run_pipeline(&config, checksum, CancellationToken::new()).await;
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batchfish` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_sync, run_pipeline};
pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_ENDPOINT};
pub use error::{BatchError, DiscoveryError, ItemError};
pub use output::{BatchSummary, FatalReport, ItemFailure, ItemStats, PipelineResult, WorkOutcome};
pub use pipeline::dispatch::{ConcurrencyGuard, DispatchReport, WorkItemProcessor};
pub use pipeline::{Phase, PipelineState};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{run_stream, BatchStream};
pub use tokio_util::sync::CancellationToken;
