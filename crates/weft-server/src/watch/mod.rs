//! Source watching and serialized rebuilds.
//!
//! ```text
//! notify callback ──record──► EventDebouncer ◄──drain (50ms)── tokio task
//!                                                                  │
//!                                                        Vec<PathBuf> batch
//!                                                                  ▼
//!                                                      rebuild worker thread
//! ```
//!
//! The worker runs one build at a time. Batches that arrive while a build is
//! running are merged into a single changed set for the next build.

mod debouncer;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use weft_config::BuildPaths;

use crate::error::ServerError;
use debouncer::{ChangeKind, EventDebouncer};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decides which filesystem paths can affect a build.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFilter {
    extension: String,
    manifest: PathBuf,
    generated: BuildPaths,
}

impl ChangeFilter {
    pub(crate) fn new(extension: &str, manifest: &Path, generated: &BuildPaths) -> Self {
        Self {
            extension: extension.to_owned(),
            manifest: manifest.to_path_buf(),
            generated: generated.clone(),
        }
    }

    /// Source files outside the generated directories, and the manifest.
    pub(crate) fn accepts(&self, path: &Path) -> bool {
        if path == self.manifest {
            return true;
        }
        !self.generated.is_generated(path)
            && path
                .extension()
                .is_some_and(|ext| ext == self.extension.as_str())
    }
}

/// Keeps the watcher and its drain task alive.
pub(crate) struct SourceWatcher {
    _watcher: RecommendedWatcher,
    drain: tokio::task::JoinHandle<()>,
}

impl SourceWatcher {
    /// Watch `root` recursively, sending settled batches of changed paths
    /// to `rebuilds`.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn start(
        root: &Path,
        filter: ChangeFilter,
        window: Duration,
        rebuilds: mpsc::Sender<Vec<PathBuf>>,
    ) -> Result<Self, ServerError> {
        let debouncer = Arc::new(EventDebouncer::new(window));

        let recorder = Arc::clone(&debouncer);
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => record_event(&event, &filter, &recorder),
                Err(e) => tracing::warn!(error = %e, "watch error"),
            }
        })
        .map_err(|source| ServerError::Watch {
            path: root.to_path_buf(),
            source,
        })?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| ServerError::Watch {
                path: root.to_path_buf(),
                source,
            })?;

        let drain = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                let batch: Vec<PathBuf> = debouncer
                    .drain_ready()
                    .into_iter()
                    .map(|change| {
                        tracing::debug!(path = %change.path.display(), kind = ?change.kind, "change settled");
                        change.path
                    })
                    .collect();
                if batch.is_empty() {
                    continue;
                }
                tracing::info!(paths = batch.len(), "sources changed, scheduling rebuild");
                if rebuilds.send(batch).is_err() {
                    break;
                }
            }
        });

        tracing::info!(root = %root.display(), "watching sources");
        Ok(Self {
            _watcher: watcher,
            drain,
        })
    }

    /// Stop forwarding changes. Closing the batch channel ends the worker.
    pub(crate) fn stop(self) {
        self.drain.abort();
    }
}

fn record_event(event: &Event, filter: &ChangeFilter, debouncer: &EventDebouncer) {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        _ => return,
    };
    for path in event.paths.iter().filter(|p| filter.accepts(p)) {
        tracing::debug!(path = %path.display(), ?kind, "recorded change");
        debouncer.record(path.clone(), kind);
    }
}

/// Spawn the rebuild worker thread.
///
/// `rebuild` receives the sorted, deduplicated union of every batch queued
/// since the previous call. The thread ends when all senders are dropped.
pub(crate) fn spawn_worker<F>(mut rebuild: F) -> (mpsc::Sender<Vec<PathBuf>>, JoinHandle<()>)
where
    F: FnMut(Vec<PathBuf>) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Vec<PathBuf>>();
    let handle = std::thread::spawn(move || {
        while let Ok(batch) = rx.recv() {
            let mut changed: BTreeSet<PathBuf> = batch.into_iter().collect();
            while let Ok(more) = rx.try_recv() {
                changed.extend(more);
            }
            rebuild(changed.into_iter().collect());
        }
        tracing::debug!("rebuild worker stopped");
    });
    (tx, handle)
}
