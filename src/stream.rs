//! Streaming API: emit outcomes as files complete.
//!
//! ## Why stream?
//!
//! Large trees take hours. A stream lets callers react to each file as soon
//! as it finishes (log it, move the input, update a dashboard) instead of
//! waiting for the whole batch. Outcomes arrive in completion order, not
//! discovery order.
//!
//! [`crate::batch::run_pipeline`] is built on top of this: it folds the
//! stream with an [`crate::pipeline::aggregate::Aggregator`].

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::output::WorkOutcome;
use crate::pipeline::discover::PathSource;
use crate::pipeline::dispatch::{DispatchReport, Dispatcher, WorkItemProcessor};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Outcomes of a running batch, in completion order.
///
/// The stream ends once every dispatched execution has reported. Call
/// [`BatchStream::finish`] afterwards to learn how the walk terminated.
pub struct BatchStream {
    outcomes: ReceiverStream<WorkOutcome>,
    dispatcher: JoinHandle<DispatchReport>,
}

impl BatchStream {
    /// Wait for the dispatcher and return its report.
    ///
    /// Dropping unread outcomes is allowed; their executions still finish.
    pub async fn finish(self) -> Result<DispatchReport, BatchError> {
        drop(self.outcomes);
        self.dispatcher
            .await
            .map_err(|e| BatchError::DispatcherFailed(e.to_string()))
    }
}

impl Stream for BatchStream {
    type Item = WorkOutcome;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<WorkOutcome>> {
        Pin::new(&mut self.get_mut().outcomes).poll_next(cx)
    }
}

/// Start walking `config.input_root` and dispatching `processor` over every
/// discovered file. Must be called from within a tokio runtime.
pub fn run_stream<P>(
    config: &BatchConfig,
    processor: Arc<P>,
    cancel: CancellationToken,
) -> BatchStream
where
    P: WorkItemProcessor + 'static,
{
    let source = PathSource::discover(
        &config.input_root,
        config.skip_dir.as_deref(),
        cancel.clone(),
    );
    let (tx, rx) = mpsc::channel(config.max_concurrent.max(1));
    let dispatcher = Dispatcher::new(processor, config.max_concurrent, cancel)
        .with_progress(config.progress_callback.clone());

    BatchStream {
        outcomes: ReceiverStream::new(rx),
        dispatcher: tokio::spawn(dispatcher.run(source, tx)),
    }
}
