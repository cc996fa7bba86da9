//! Integration tests for the discovery → dispatch → aggregate pipeline.
//!
//! These use closure processors over temporary directory trees, so no
//! network or PDF engine is needed.

use batchfish::pipeline::discover::PathSource;
use batchfish::pipeline::dispatch::Dispatcher;
use batchfish::pipeline::aggregate::Aggregator;
use batchfish::{
    run_pipeline, run_stream, BatchConfig, BatchError, CancellationToken, DiscoveryError,
    ItemError, ItemStats, Phase, WorkOutcome,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn touch_files(root: &Path, names: &[&str]) {
    for name in names {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"%PDF-1.4").unwrap();
    }
}

fn config_for(root: &Path, max_concurrent: usize) -> BatchConfig {
    BatchConfig::builder()
        .input_root(root)
        .max_concurrent(max_concurrent)
        .count_pages(false)
        .build()
        .unwrap()
}

/// Tracks the highest number of simultaneously running executions.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Concurrency bound ────────────────────────────────────────────────────────

#[tokio::test]
async fn in_flight_never_exceeds_cap() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..12).map(|i| format!("doc{i}.pdf")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    touch_files(dir.path(), &refs);

    let tracker = Arc::new(InFlight::default());
    let seen = Arc::clone(&tracker);
    let processor = Arc::new(move |_path: PathBuf| {
        let seen = Arc::clone(&seen);
        async move {
            seen.enter();
            tokio::time::sleep(Duration::from_millis(20)).await;
            seen.leave();
            Ok::<_, ItemError>(ItemStats::default())
        }
    });

    let result = run_pipeline(&config_for(dir.path(), 3), processor, CancellationToken::new()).await;

    assert!(result.is_success(), "fatal: {:?}", result.fatal);
    assert_eq!(result.attempted, 12);
    assert_eq!(result.succeeded, 12);
    let peak = tracker.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight was {peak}");
    assert!(peak >= 2, "expected some parallelism, peak was {peak}");
}

#[tokio::test]
async fn cap_of_one_is_sequential() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["a.pdf", "b.pdf", "c.pdf"]);

    let tracker = Arc::new(InFlight::default());
    let seen = Arc::clone(&tracker);
    let processor = Arc::new(move |_path: PathBuf| {
        let seen = Arc::clone(&seen);
        async move {
            seen.enter();
            tokio::time::sleep(Duration::from_millis(10)).await;
            seen.leave();
            Ok::<_, ItemError>(ItemStats::default())
        }
    });

    let result = run_pipeline(&config_for(dir.path(), 1), processor, CancellationToken::new()).await;
    assert_eq!(result.succeeded, 3);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn makespan_reflects_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"]);

    let processor = Arc::new(|_path: PathBuf| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, ItemError>(ItemStats::default())
    });

    let start = Instant::now();
    let result = run_pipeline(&config_for(dir.path(), 2), processor, CancellationToken::new()).await;
    let elapsed = start.elapsed();

    assert_eq!(result.succeeded, 5);
    // ceil(5 / 2) = 3 rounds of 200ms.
    assert!(elapsed >= Duration::from_millis(600), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "too slow: {elapsed:?}");
    assert!(result.processing_time >= Duration::from_millis(1000));
}

// ── Discovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn skip_dir_children_are_not_dispatched() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(
        dir.path(),
        &["a.pdf", "nested/b.pdf", "nested/deeper/c.pdf", "done/old.pdf"],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let processor = Arc::new(move |path: PathBuf| {
        record.lock().unwrap().push(path);
        async move { Ok::<_, ItemError>(ItemStats::default()) }
    });

    let config = BatchConfig::builder()
        .input_root(dir.path())
        .skip_dir("done")
        .count_pages(false)
        .build()
        .unwrap();
    let result = run_pipeline(&config, processor, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.attempted, 3);
    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|p| !p.starts_with(dir.path().join("done"))));
}

#[tokio::test]
async fn empty_tree_finishes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();

    let processor = Arc::new(|_path: PathBuf| async move {
        Ok::<_, ItemError>(ItemStats::default())
    });
    let result = run_pipeline(&config_for(dir.path(), 4), processor, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.attempted, 0);
    assert_eq!(result.succeeded, 0);
}

#[tokio::test]
async fn missing_root_is_a_discovery_failure() {
    let dir = tempfile::tempdir().unwrap();
    let processor = Arc::new(|_path: PathBuf| async move {
        Ok::<_, ItemError>(ItemStats::default())
    });

    let result = run_pipeline(
        &config_for(&dir.path().join("nope"), 2),
        processor,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(result.attempted, 0);
    let fatal = result.fatal.expect("walk failure must be fatal");
    assert_eq!(fatal.phase(), Some(Phase::Discovery));
    assert!(!fatal.is_cancellation());
}

#[tokio::test]
async fn walk_failure_after_dispatch_still_drains() {
    let entries: Vec<Result<PathBuf, DiscoveryError>> = vec![
        Ok(PathBuf::from("one.pdf")),
        Ok(PathBuf::from("two.pdf")),
        Err(DiscoveryError::Io {
            path: Some(PathBuf::from("locked")),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }),
        Ok(PathBuf::from("never.pdf")),
    ];
    let source = PathSource::from_entries(entries, CancellationToken::new());

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let processor = Arc::new(move |_path: PathBuf| {
        let counter = Arc::clone(&counter);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ItemError>(ItemStats::default())
        }
    });

    let (tx, mut rx) = mpsc::channel(4);
    let report = Dispatcher::new(processor, 4, CancellationToken::new())
        .run(source, tx)
        .await;

    // Both executions finished before the failure was reported.
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(report.spawned, 2);
    let walk_err = assert_err!(report.walk);
    assert!(matches!(walk_err, DiscoveryError::Io { .. }));

    let mut aggregator = Aggregator::new(None);
    while let Some(outcome) = rx.recv().await {
        aggregator.record(outcome);
    }
    aggregator.record_fatal(BatchError::from(walk_err));
    let result = aggregator.finalize();
    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.fatal.and_then(|e| e.phase()), Some(Phase::Discovery));
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failure_does_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["good1.pdf", "bad.pdf", "good2.pdf", "good3.pdf"]);

    let processor = Arc::new(|path: PathBuf| async move {
        if path.file_name().is_some_and(|n| n == "bad.pdf") {
            return Err(ItemError::BadStatus {
                status: 500,
                reason: "Internal Server Error".into(),
            });
        }
        Ok(ItemStats {
            pages: Some(2),
            output: None,
        })
    });

    let result = run_pipeline(&config_for(dir.path(), 2), processor, CancellationToken::new()).await;

    assert!(result.is_success(), "per-item failures are not fatal");
    assert_eq!(result.attempted, 4);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed(), 1);
    assert_eq!(result.total_pages, 6);
    assert!(result.failures[0].path.ends_with("bad.pdf"));
}

#[tokio::test]
async fn panicking_item_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["a.pdf", "boom.pdf", "c.pdf"]);

    let processor = Arc::new(|path: PathBuf| async move {
        if path.ends_with("boom.pdf") {
            panic!("parser exploded");
        }
        Ok::<_, ItemError>(ItemStats::default())
    });

    let result = run_pipeline(&config_for(dir.path(), 3), processor, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.attempted, 3);
    assert_eq!(result.succeeded, 2);
    assert!(matches!(result.failures[0].error, ItemError::Panicked { .. }));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_stops_dispatch_but_finishes_started_work() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..20).map(|i| format!("doc{i:02}.pdf")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    touch_files(dir.path(), &refs);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
    let processor = Arc::new(move |_path: PathBuf| {
        let (s, f, trigger) = (Arc::clone(&s), Arc::clone(&f), trigger.clone());
        async move {
            if s.fetch_add(1, Ordering::SeqCst) == 0 {
                trigger.cancel();
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ItemError>(ItemStats::default())
        }
    });

    let result = run_pipeline(&config_for(dir.path(), 2), processor, cancel).await;

    let started = started.load(Ordering::SeqCst);
    assert!(started < 20, "dispatch should stop early, started {started}");
    assert_eq!(finished.load(Ordering::SeqCst), started);
    assert_eq!(result.attempted, started);
    assert_eq!(result.succeeded, started);
    let fatal = result.fatal.expect("cancelled walk is reported");
    assert!(fatal.is_cancellation());
}

#[tokio::test]
async fn cancel_while_paths_are_pending_is_not_reported_as_complete() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["a.pdf", "b.pdf", "c.pdf"]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let processor = Arc::new(move |_path: PathBuf| {
        let trigger = trigger.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
            Ok::<_, ItemError>(ItemStats::default())
        }
    });

    let result = run_pipeline(&config_for(dir.path(), 1), processor, cancel).await;

    assert_eq!(result.attempted, 1);
    assert_eq!(result.succeeded, 1);
    let fatal = result
        .fatal
        .expect("undispatched files must not look like a complete run");
    assert!(fatal.is_cancellation(), "got: {fatal}");
    assert_eq!(fatal.phase(), Some(Phase::Discovery));
}

#[tokio::test]
async fn precancelled_token_dispatches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["a.pdf", "b.pdf"]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let processor = Arc::new(|_path: PathBuf| async move {
        Ok::<_, ItemError>(ItemStats::default())
    });

    let result = run_pipeline(&config_for(dir.path(), 2), processor, cancel).await;
    assert_eq!(result.attempted, 0);
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_every_outcome_then_reports() {
    let dir = tempfile::tempdir().unwrap();
    touch_files(dir.path(), &["x.pdf", "y.pdf", "z/w.pdf"]);

    let processor = Arc::new(|path: PathBuf| async move {
        if path.ends_with("y.pdf") {
            Err(ItemError::Processing("unsupported".into()))
        } else {
            Ok(ItemStats::default())
        }
    });

    let mut stream = run_stream(&config_for(dir.path(), 2), processor, CancellationToken::new());
    let mut outcomes: Vec<WorkOutcome> = Vec::new();
    while let Some(outcome) = stream.next().await {
        outcomes.push(outcome);
    }

    let report = assert_ok!(stream.finish().await);
    assert_eq!(report.spawned, 3);
    assert_eq!(assert_ok!(report.walk), 3);
    assert!(report.fault.is_none());
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
}
