//! Debounced, batched change notifications.
//!
//! Editors emit bursts of correlated events (a save is often delete+create,
//! a checkout touches hundreds of files). `RefreshScheduler` gathers the
//! affected paths and tells the host about them in one batch once the burst
//! has gone quiet.
//!
//! ```text
//! request_update ──► Debouncing ──(quiet for delay)──► Flushing ──► Idle
//!        ▲               │
//!        └── resets timer┘
//! ```
//!
//! In bulk mode (initialization scans) requests skip the timer and flush
//! immediately, one notification per batch.

use crate::decoration::cache::CacheStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// User-visible messages for the host to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// A one-off informational message.
    Info(String),
    /// A transient status line.
    Status(String),
}

/// Notification sent to the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LensNotification {
    /// Decorations for these paths may have changed; re-query them.
    DecorationsChanged {
        /// Files and folders to re-query.
        paths: Vec<PathBuf>,
    },
    /// Every cached decoration was dropped; re-query everything visible.
    RefreshAll,
    /// A message for the user.
    Message(HostMessage),
}

/// Where the scheduler is in its debounce cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing pending.
    Idle,
    /// A timer is armed for pending paths.
    Debouncing,
    /// Pending paths are being sent.
    Flushing,
}

struct SchedulerInner {
    state: SchedulerState,
    pending: HashSet<PathBuf>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every timer replacement; a timer only flushes if it is
    /// still the current one.
    generation: u64,
}

/// Coalesces refresh requests into batched host notifications.
pub struct RefreshScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    caches: Arc<CacheStore>,
    notifier: broadcast::Sender<LensNotification>,
    default_delay: Duration,
    bulk: AtomicBool,
}

impl RefreshScheduler {
    /// Creates an idle scheduler sending on `notifier`.
    pub fn new(
        caches: Arc<CacheStore>,
        notifier: broadcast::Sender<LensNotification>,
        default_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                state: SchedulerState::Idle,
                pending: HashSet::new(),
                timer: None,
                generation: 0,
            })),
            caches,
            notifier,
            default_delay,
            bulk: AtomicBool::new(false),
        }
    }

    /// Current debounce state.
    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    /// Paths waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Subscribe to host notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LensNotification> {
        self.notifier.subscribe()
    }

    /// Enter or leave bulk mode. While in bulk mode every request flushes
    /// immediately.
    pub fn set_bulk(&self, bulk: bool) {
        self.bulk.store(bulk, Ordering::SeqCst);
    }

    /// Whether bulk mode is on.
    pub fn is_bulk(&self) -> bool {
        self.bulk.load(Ordering::SeqCst)
    }

    /// Queue `paths` for the next batched notification, using the default
    /// debounce delay. Must be called from within a tokio runtime.
    pub fn request_update<I>(&self, paths: I, invalidate: bool)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.request_update_after(paths, invalidate, self.default_delay);
    }

    /// Queue `paths` and (re)arm the debounce timer with `delay`.
    ///
    /// With `invalidate`, the paths' cache entries are dropped right away,
    /// before the timer is armed.
    ///
    /// # Panics
    /// Outside a tokio runtime, since the timer is a spawned task.
    pub fn request_update_after<I>(&self, paths: I, invalidate: bool, delay: Duration)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().collect();
        if invalidate {
            for path in &paths {
                self.caches.invalidate_path(path);
            }
        }

        if self.is_bulk() {
            self.flush_now(paths);
            return;
        }

        let mut inner = self.inner.lock();
        inner.pending.extend(paths);
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        inner.state = SchedulerState::Debouncing;

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let notifier = self.notifier.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = shared.lock();
            if inner.generation == generation {
                inner.timer = None;
                flush(&mut inner, &notifier);
            }
        }));
    }

    /// Queue `paths` and flush everything pending right now, cancelling
    /// any armed timer.
    pub fn flush_now<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut inner = self.inner.lock();
        inner.pending.extend(paths);
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        flush(&mut inner, &self.notifier);
    }

    /// Send a notification that bypasses batching.
    pub fn notify(&self, notification: LensNotification) {
        if let Err(e) = self.notifier.send(notification) {
            tracing::debug!("No listener for lens notification: {}", e);
        }
    }

    /// Cancel the timer and drop pending paths.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        inner.pending.clear();
        inner.state = SchedulerState::Idle;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}

fn flush(inner: &mut SchedulerInner, notifier: &broadcast::Sender<LensNotification>) {
    inner.state = SchedulerState::Flushing;
    let paths: Vec<PathBuf> = inner.pending.drain().collect();
    if !paths.is_empty() {
        tracing::debug!("Flushing decoration refresh for {} paths", paths.len());
        if let Err(e) = notifier.send(LensNotification::DecorationsChanged { paths }) {
            tracing::debug!("No listener for decoration refresh: {}", e);
        }
    }
    inner.state = SchedulerState::Idle;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoration::format::Decoration;
    use std::path::Path;

    fn scheduler(delay_ms: u64) -> (RefreshScheduler, Arc<CacheStore>, broadcast::Receiver<LensNotification>) {
        let caches = Arc::new(CacheStore::new(100));
        let (tx, rx) = broadcast::channel(16);
        let scheduler = RefreshScheduler::new(Arc::clone(&caches), tx, Duration::from_millis(delay_ms));
        (scheduler, caches, rx)
    }

    fn changed_paths(notification: LensNotification) -> Vec<PathBuf> {
        match notification {
            LensNotification::DecorationsChanged { mut paths } => {
                paths.sort();
                paths
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_flush() {
        let (scheduler, _, mut rx) = scheduler(300);

        scheduler.request_update(vec![PathBuf::from("/a")], false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.request_update(vec![PathBuf::from("/b")], false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.request_update(vec![PathBuf::from("/a"), PathBuf::from("/c")], false);

        assert_eq!(scheduler.state(), SchedulerState::Debouncing);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let paths = changed_paths(rx.try_recv().unwrap());
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_delay_wins() {
        let (scheduler, _, mut rx) = scheduler(300);

        scheduler.request_update(vec![PathBuf::from("/a")], false);
        scheduler.request_update_after(vec![PathBuf::from("/b")], false, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(changed_paths(rx.try_recv().unwrap()).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_is_immediate() {
        let (scheduler, caches, _rx) = scheduler(300);
        let path = Path::new("/repo/a.rs");
        caches.record_count(path, 10, 3);
        caches.set_decoration(path, Decoration::file(3));

        scheduler.request_update(vec![path.to_path_buf()], true);

        assert_eq!(caches.line_count(path), None);
        assert_eq!(caches.size(path), None);
        assert!(caches.decoration(path).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_invalidate_cache_survives() {
        let (scheduler, caches, _rx) = scheduler(300);
        let path = Path::new("/repo");
        caches.set_folder_total(path, 10);

        scheduler.request_update(vec![path.to_path_buf()], false);
        assert_eq!(caches.folder_total(path), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_mode_flushes_per_request() {
        let (scheduler, _, mut rx) = scheduler(300);
        scheduler.set_bulk(true);

        scheduler.request_update(vec![PathBuf::from("/a"), PathBuf::from("/b")], true);
        assert_eq!(changed_paths(rx.try_recv().unwrap()).len(), 2);

        scheduler.request_update(vec![PathBuf::from("/c")], true);
        assert_eq!(changed_paths(rx.try_recv().unwrap()), vec![PathBuf::from("/c")]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_cancels_timer() {
        let (scheduler, _, mut rx) = scheduler(300);

        scheduler.request_update(vec![PathBuf::from("/a")], false);
        scheduler.flush_now(vec![PathBuf::from("/b")]);
        assert_eq!(changed_paths(rx.try_recv().unwrap()).len(), 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending() {
        let (scheduler, _, mut rx) = scheduler(300);

        scheduler.request_update(vec![PathBuf::from("/a")], false);
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    #[should_panic]
    fn test_debounced_request_needs_runtime() {
        let (scheduler, _, _rx) = scheduler(10);
        scheduler.request_update(vec![PathBuf::from("/a")], false);
    }

    #[test]
    fn test_bulk_request_works_without_runtime() {
        let (scheduler, _, mut rx) = scheduler(10);
        scheduler.set_bulk(true);
        scheduler.request_update(vec![PathBuf::from("/a")], false);
        assert_eq!(changed_paths(rx.try_recv().unwrap()), vec![PathBuf::from("/a")]);
    }
}
