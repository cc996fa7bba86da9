//! Path discovery: walk the input root and lazily yield regular files.
//!
//! ## Why a blocking thread and a capacity-1 channel?
//!
//! `walkdir` performs synchronous directory reads, so the walk runs inside
//! `tokio::task::spawn_blocking`. Each discovered path is handed over with
//! `blocking_send` on a channel of capacity 1, which makes the walker advance
//! only as fast as the dispatcher accepts work. Closing the receiving end
//! wakes a walker parked in `blocking_send`, so a cancelled pipeline stops the
//! traversal promptly instead of silently truncating it.

use crate::error::DiscoveryError;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// A lazy sequence of discovered paths plus one terminal walk signal.
///
/// Exactly one walker runs per `PathSource`.
pub struct PathSource {
    paths: mpsc::Receiver<PathBuf>,
    walker: JoinHandle<Result<usize, DiscoveryError>>,
}

impl PathSource {
    /// Start walking `root`, skipping non-regular files and every file whose
    /// parent directory equals `skip_dir`.
    ///
    /// A relative `skip_dir` is resolved against `root`.
    pub fn discover(root: &Path, skip_dir: Option<&Path>, cancel: CancellationToken) -> Self {
        let root = root.to_path_buf();
        let skip = skip_dir.map(|s| resolve_skip_dir(&root, s));
        info!("Discovering files under {}", root.display());

        let entries = WalkDir::new(&root)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => is_candidate(&entry, skip.as_deref()).then(|| Ok(entry.into_path())),
                Err(err) => Some(Err(DiscoveryError::from(err))),
            });

        Self::from_entries(entries, cancel)
    }

    /// Feed an arbitrary sequence of walk results through the same
    /// backpressured, cancellable hand-off used by [`PathSource::discover`].
    ///
    /// The first `Err` terminates the sequence and becomes the terminal signal.
    pub fn from_entries<I>(entries: I, cancel: CancellationToken) -> Self
    where
        I: IntoIterator<Item = Result<PathBuf, DiscoveryError>> + Send + 'static,
        I::IntoIter: Send,
    {
        let (tx, rx) = mpsc::channel(1);
        let walker = tokio::task::spawn_blocking(move || feed(entries, tx, cancel));
        Self { paths: rx, walker }
    }

    /// Next discovered path, or `None` once the walk has terminated.
    pub async fn next(&mut self) -> Option<PathBuf> {
        self.paths.recv().await
    }

    /// Stop accepting paths. A walker blocked on hand-off aborts with
    /// [`DiscoveryError::Canceled`].
    pub fn close(&mut self) {
        self.paths.close();
    }

    /// Wait for the walker and return its terminal signal: the number of
    /// paths yielded, or the error that ended the walk.
    pub async fn finish(mut self) -> Result<usize, DiscoveryError> {
        self.paths.close();
        match self.walker.await {
            Ok(result) => result,
            Err(e) => Err(DiscoveryError::WalkerPanicked(e.to_string())),
        }
    }
}

fn feed<I>(
    entries: I,
    tx: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<usize, DiscoveryError>
where
    I: IntoIterator<Item = Result<PathBuf, DiscoveryError>>,
{
    let mut yielded = 0usize;
    for entry in entries {
        let path = entry?;
        if cancel.is_cancelled() {
            debug!("Walk canceled after {} paths", yielded);
            return Err(DiscoveryError::Canceled);
        }
        // Err means the receiver was closed or dropped.
        if tx.blocking_send(path).is_err() {
            debug!("Path receiver closed after {} paths", yielded);
            return Err(DiscoveryError::Canceled);
        }
        yielded += 1;
    }
    debug!("Walk complete: {} paths", yielded);
    Ok(yielded)
}

/// Regular file whose parent is not the skipped directory.
fn is_candidate(entry: &DirEntry, skip_dir: Option<&Path>) -> bool {
    if !entry.file_type().is_file() {
        return false;
    }
    match skip_dir {
        Some(skip) => entry.path().parent() != Some(skip),
        None => true,
    }
}

fn resolve_skip_dir(root: &Path, skip: &Path) -> PathBuf {
    if skip.is_absolute() || skip.starts_with(root) {
        skip.to_path_buf()
    } else {
        root.join(skip)
    }
}
