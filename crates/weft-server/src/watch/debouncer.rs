//! Per-path coalescing of filesystem events.
//!
//! Editors emit several events per save (truncate, write, rename). The
//! debouncer keeps one pending change per path and releases it once the path
//! has been quiet for the debounce window.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Kind of source change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A change whose debounce window has elapsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SettledChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Thread-safe event debouncer, fed from the watcher callback and drained
/// by a polling task.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, Pending>>,
    window: Duration,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Record a change, restarting the path's quiet window.
    pub fn record(&self, path: PathBuf, kind: ChangeKind) {
        let mut pending = self.pending.lock().unwrap();
        let deadline = Instant::now() + self.window;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(Pending { kind, deadline });
            }
            Entry::Occupied(mut entry) => match Self::coalesce(entry.get().kind, kind) {
                Some(kind) => {
                    *entry.get_mut() = Pending { kind, deadline };
                }
                None => {
                    entry.remove();
                }
            },
        }
    }

    /// Combined kind of two consecutive changes.
    ///
    /// `None` means the path never existed as far as a build is concerned.
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Removed) => None,
            (Created, _) => Some(Created),
            (Modified, kind) => Some(kind),
            // Replaced through write-to-temp and rename
            (Removed, Created) => Some(Modified),
            (Removed, _) => Some(Removed),
        }
    }

    /// Take every change whose quiet window has elapsed, sorted by path.
    pub fn drain_ready(&self) -> Vec<SettledChange> {
        let mut pending = self.pending.lock().unwrap();
        let now = Instant::now();

        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, change)| change.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut settled: Vec<SettledChange> = ready
            .into_iter()
            .filter_map(|path| {
                let change = pending.remove(&path)?;
                Some(SettledChange {
                    path,
                    kind: change.kind,
                })
            })
            .collect();
        settled.sort_by(|a, b| a.path.cmp(&b.path));
        settled
    }
}
