//! Workspace file watcher.
//!
//! Turns raw notify events into the engine's [`HostEvent`]s. Bursts are
//! coalesced per path before they are handed over, and paths whose native
//! watch fails (NFS, WSL, network drives) fall back to polling.

use crate::decoration::engine::HostEvent;
use crate::error::{LensError, Result};
use notify::{
    event::ModifyKind, Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

/// Simplified change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    /// Path created.
    Create,
    /// Contents or metadata changed.
    Modify,
    /// Path removed.
    Remove,
    /// Path renamed; resolved by whether it still exists.
    Rename,
}

impl From<EventKind> for FileChangeKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FileChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => FileChangeKind::Rename,
            EventKind::Modify(_) => FileChangeKind::Modify,
            EventKind::Remove(_) => FileChangeKind::Remove,
            _ => FileChangeKind::Modify,
        }
    }
}

/// One raw change observed for a path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChangeEvent {
    /// Path that changed.
    pub path: PathBuf,
    /// What happened to it.
    pub kind: FileChangeKind,
    /// When the event was received.
    pub timestamp: Instant,
}

/// Watches workspace roots and yields debounced host events.
pub struct WorkspaceWatcher {
    native: Option<RecommendedWatcher>,
    poll: PollWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    polled_paths: HashSet<PathBuf>,
    pending: Vec<FileChangeEvent>,
    debounce: Duration,
}

impl WorkspaceWatcher {
    /// Creates a new watcher.
    ///
    /// # Arguments
    /// * `debounce_ms` - Quiet period after the last raw event before a batch is flushed
    /// * `poll_interval_ms` - Interval for the polling fallback
    pub fn new(debounce_ms: u64, poll_interval_ms: u64) -> Result<Self> {
        let (tx, rx) = channel();
        let poll_tx = tx.clone();

        let native_config = Config::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_compare_contents(false);

        let native = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            native_config,
        )
        .map_err(|e| tracing::warn!("Native watcher unavailable, polling only: {}", e))
        .ok();

        let poll_config = Config::default()
            .with_poll_interval(Duration::from_millis(poll_interval_ms))
            .with_compare_contents(false);

        let poll = PollWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = poll_tx.send(res);
            },
            poll_config,
        )?;

        Ok(Self {
            native,
            poll,
            event_rx: rx,
            polled_paths: HashSet::new(),
            pending: Vec::new(),
            debounce: Duration::from_millis(debounce_ms),
        })
    }

    /// Watch a workspace root recursively.
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if let Some(native) = self.native.as_mut() {
            match native.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    tracing::debug!("Using native watcher for {}", path.display());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Native watcher failed for {}: {}, falling back to polling",
                        path.display(),
                        e
                    );
                }
            }
        }

        tracing::debug!("Using poll watcher for {}", path.display());
        self.polled_paths.insert(path.to_path_buf());
        self.poll
            .watch(path, RecursiveMode::Recursive)
            .map_err(|source| LensError::Watch {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Stop watching a root.
    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        let result = if self.polled_paths.remove(path) {
            self.poll.unwatch(path)
        } else if let Some(native) = self.native.as_mut() {
            native.unwatch(path)
        } else {
            Ok(())
        };
        result.map_err(|source| LensError::Watch {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether `path` fell back to the poll watcher.
    pub fn is_using_polling(&self, path: &Path) -> bool {
        self.polled_paths.contains(path)
    }

    /// Drain raw events from notify into the pending buffer.
    pub fn poll_events(&mut self) {
        while let Ok(result) = self.event_rx.try_recv() {
            match result {
                Ok(event) => {
                    let kind = FileChangeKind::from(event.kind);
                    if matches!(event.kind, EventKind::Access(_)) {
                        continue;
                    }
                    for path in event.paths {
                        self.pending.push(FileChangeEvent {
                            path,
                            kind,
                            timestamp: Instant::now(),
                        });
                    }
                }
                Err(e) => tracing::warn!("Watcher error: {}", e),
            }
        }
    }

    /// Coalesced host events, once no raw event has arrived for the
    /// debounce period (or the oldest one has waited `MAX_WAIT_FACTOR`
    /// periods). Empty otherwise.
    pub fn flush_if_ready(&mut self) -> Vec<HostEvent> {
        if !ready_to_flush(&self.pending, Instant::now(), self.debounce) {
            return Vec::new();
        }

        let events = std::mem::take(&mut self.pending);
        coalesce_events(events, |path| path.exists())
    }
}

/// A burst that never goes quiet is still flushed after this many debounce
/// periods.
const MAX_WAIT_FACTOR: u32 = 4;

fn ready_to_flush(pending: &[FileChangeEvent], now: Instant, debounce: Duration) -> bool {
    let (Some(oldest), Some(newest)) = (
        pending.iter().map(|e| e.timestamp).min(),
        pending.iter().map(|e| e.timestamp).max(),
    ) else {
        return false;
    };
    now.duration_since(newest) >= debounce
        || now.duration_since(oldest) >= debounce * MAX_WAIT_FACTOR
}

/// Collapse a burst of raw changes into at most one host event per path.
///
/// Rules:
/// - REMOVE followed by CREATE = save (file was replaced)
/// - CREATE followed by REMOVE = nothing (never visible to the host)
/// - CREATE followed by MODIFY = create
/// - RENAME resolves to create or delete depending on whether the path
///   exists now
fn coalesce_events<F>(events: Vec<FileChangeEvent>, exists: F) -> Vec<HostEvent>
where
    F: Fn(&Path) -> bool,
{
    let mut order: Vec<PathBuf> = Vec::new();
    let mut by_path: HashMap<PathBuf, Option<FileChangeKind>> = HashMap::new();

    for event in events {
        let kind = match event.kind {
            FileChangeKind::Rename if exists(&event.path) => FileChangeKind::Create,
            FileChangeKind::Rename => FileChangeKind::Remove,
            other => other,
        };

        match by_path.get_mut(&event.path) {
            None => {
                order.push(event.path.clone());
                by_path.insert(event.path, Some(kind));
            }
            Some(existing) => {
                *existing = match (*existing, kind) {
                    (Some(FileChangeKind::Remove), FileChangeKind::Create) => {
                        Some(FileChangeKind::Modify)
                    }
                    (Some(FileChangeKind::Create), FileChangeKind::Remove) => None,
                    (Some(FileChangeKind::Create), FileChangeKind::Modify) => {
                        Some(FileChangeKind::Create)
                    }
                    (None, FileChangeKind::Modify) => Some(FileChangeKind::Create),
                    (_, kind) => Some(kind),
                };
            }
        }
    }

    order
        .into_iter()
        .filter_map(|path| {
            let kind = by_path.remove(&path).flatten()?;
            Some(match kind {
                FileChangeKind::Create | FileChangeKind::Rename => HostEvent::Created(path),
                FileChangeKind::Modify => HostEvent::Saved(path),
                FileChangeKind::Remove => HostEvent::Deleted(path),
            })
        })
        .collect()
}
