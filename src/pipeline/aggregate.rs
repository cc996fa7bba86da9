//! Aggregation: fold outcomes into a [`PipelineResult`].
//!
//! The aggregator is the single consumer of the outcome channel, so it owns
//! the result exclusively and needs no locking. It records only the first
//! fatal condition; later ones are logged and dropped.

use crate::error::BatchError;
use crate::output::{ItemFailure, PipelineResult, WorkOutcome};
use crate::progress::ProgressCallback;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

/// Collects outcomes in completion order.
#[derive(Default)]
pub struct Aggregator {
    result: PipelineResult,
    progress: Option<ProgressCallback>,
}

impl Aggregator {
    pub fn new(progress: Option<ProgressCallback>) -> Self {
        Self {
            result: PipelineResult::default(),
            progress,
        }
    }

    /// Fold one outcome into the running totals.
    pub fn record(&mut self, outcome: WorkOutcome) {
        self.result.attempted += 1;
        match outcome {
            WorkOutcome::Success {
                path,
                stats,
                elapsed,
            } => {
                debug!("Completed {} in {:?}", path.display(), elapsed);
                if let Some(ref cb) = self.progress {
                    cb.on_item_complete(&path, &stats, elapsed);
                }
                self.result.succeeded += 1;
                self.result.total_pages += stats.pages.unwrap_or(0);
                self.result.processing_time += elapsed;
            }
            WorkOutcome::Failure { path, error, .. } => {
                warn!("{}: {}", path.display(), error);
                if let Some(ref cb) = self.progress {
                    cb.on_item_error(&path, &error);
                }
                self.result.failures.push(ItemFailure { path, error });
            }
        }
    }

    /// Record a fatal condition; only the first one is kept.
    pub fn record_fatal(&mut self, error: BatchError) {
        match self.result.fatal {
            None => self.result.fatal = Some(error),
            Some(ref first) => debug!("Ignoring fatal condition after '{}': {}", first, error),
        }
    }

    /// Outcomes recorded so far.
    pub fn collected(&self) -> usize {
        self.result.attempted
    }

    /// Consume `outcomes` until the stream ends.
    pub async fn collect<S>(&mut self, outcomes: S)
    where
        S: Stream<Item = WorkOutcome>,
    {
        let mut outcomes = std::pin::pin!(outcomes);
        while let Some(outcome) = outcomes.next().await {
            self.record(outcome);
        }
    }

    /// Finish and hand out the result.
    pub fn finalize(self) -> PipelineResult {
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(self.result.attempted, self.result.succeeded);
        }
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiscoveryError, ItemError};
    use crate::output::ItemStats;
    use std::time::Duration;

    fn success(name: &str, pages: Option<usize>, ms: u64) -> WorkOutcome {
        WorkOutcome::Success {
            path: name.into(),
            stats: ItemStats {
                pages,
                output: None,
            },
            elapsed: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn sums_metadata_over_successes() {
        let mut agg = Aggregator::default();
        let outcomes = futures::stream::iter(vec![
            success("a.pdf", Some(3), 100),
            WorkOutcome::Failure {
                path: "b.pdf".into(),
                error: ItemError::BadStatus {
                    status: 500,
                    reason: "Internal Server Error".into(),
                },
                elapsed: Duration::from_millis(40),
            },
            success("c.pdf", None, 50),
            success("d.pdf", Some(7), 10),
        ]);
        agg.collect(outcomes).await;
        let r = agg.finalize();

        assert_eq!(r.attempted, 4);
        assert_eq!(r.succeeded, 3);
        assert_eq!(r.total_pages, 10);
        assert_eq!(r.processing_time, Duration::from_millis(160));
        assert_eq!(r.failed(), 1);
        assert_eq!(r.failures[0].path, std::path::PathBuf::from("b.pdf"));
        assert!(r.is_success());
    }

    #[test]
    fn keeps_first_fatal_only() {
        let mut agg = Aggregator::default();
        agg.record_fatal(BatchError::Discovery(DiscoveryError::Canceled));
        agg.record_fatal(BatchError::DispatcherFailed("late".into()));
        let r = agg.finalize();
        assert!(r.fatal.as_ref().is_some_and(|e| e.is_cancellation()));
    }
}
