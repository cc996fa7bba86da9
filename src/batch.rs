//! Eager (whole-batch) entry points.
//!
//! ## Why two layers?
//!
//! [`run_batch`] does the setup that only makes sense for the HTTP unit of
//! work (read the query once, create the output directory, build the shared
//! client) and then hands off to [`run_pipeline`], which is generic over any
//! [`WorkItemProcessor`]. Callers with their own unit of work use
//! [`run_pipeline`] directly and get the same bounded dispatch, draining and
//! aggregation.

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::output::PipelineResult;
use crate::pipeline::aggregate::Aggregator;
use crate::pipeline::dispatch::WorkItemProcessor;
use crate::pipeline::remote::RemoteProcessor;
use crate::pipeline::PipelineState;
use crate::stream::run_stream;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Submit every file under `config.input_root` to `config.endpoint`.
///
/// # Returns
/// `Ok(PipelineResult)` once every dispatched file has reported, even if
/// some files failed (see `result.failures`) or the walk failed (see
/// `result.fatal`).
///
/// # Errors
/// Returns `Err(BatchError)` only for setup failures, before anything is
/// dispatched:
/// - query payload unreadable
/// - output directory cannot be created
/// - HTTP client cannot be built
pub async fn run_batch(
    config: &BatchConfig,
    cancel: CancellationToken,
) -> Result<PipelineResult, BatchError> {
    let query = config.load_query().await?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| BatchError::OutputDirUnavailable {
            path: config.output_dir.clone(),
            source: e,
        })?;

    let processor = Arc::new(RemoteProcessor::new(config, query)?);
    Ok(run_pipeline(config, processor, cancel).await)
}

/// Run the discovery → dispatch → aggregate pipeline with any unit of work.
///
/// `cancel` stops further discovery and dispatch; executions already started
/// always run to completion. The pipeline works on a child of `cancel`, so it
/// never cancels the caller's token itself.
pub async fn run_pipeline<P>(
    config: &BatchConfig,
    processor: Arc<P>,
    cancel: CancellationToken,
) -> PipelineResult
where
    P: WorkItemProcessor + 'static,
{
    let start = Instant::now();
    let progress = config.progress_callback.clone();
    if let Some(ref cb) = progress {
        cb.on_state_change(PipelineState::Idle);
    }
    info!(
        "Starting batch: root={} max_concurrent={}",
        config.input_root.display(),
        config.max_concurrent
    );

    let mut stream = run_stream(config, processor, cancel.child_token());
    let mut aggregator = Aggregator::new(progress.clone());
    aggregator.collect(&mut stream).await;

    match stream.finish().await {
        Ok(report) => {
            if let Some(fault) = report.fault {
                aggregator.record_fatal(fault);
            }
            if let Err(e) = report.walk {
                aggregator.record_fatal(e.into());
            }
            if aggregator.collected() != report.spawned {
                aggregator.record_fatal(BatchError::OutcomeCountMismatch {
                    spawned: report.spawned,
                    collected: aggregator.collected(),
                });
            }
        }
        Err(e) => aggregator.record_fatal(e),
    }

    if let Some(ref cb) = progress {
        cb.on_state_change(PipelineState::Finalized);
    }
    let mut result = aggregator.finalize();
    result.wall_time = start.elapsed();

    match result.fatal {
        Some(ref e) => warn!(
            "Batch stopped in {} phase: {} ({} attempted, {} succeeded)",
            e.phase().map(|p| p.to_string()).unwrap_or_else(|| "setup".into()),
            e,
            result.attempted,
            result.succeeded
        ),
        None => info!(
            "Batch complete: {}/{} files, {} pages, {}ms",
            result.succeeded,
            result.attempted,
            result.total_pages,
            result.wall_time.as_millis()
        ),
    }
    result
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally; the run cannot be cancelled.
pub fn run_batch_sync(config: &BatchConfig) -> Result<PipelineResult, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(config, CancellationToken::new()))
}
