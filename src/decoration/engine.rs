//! The decoration engine: answers badge queries and reacts to file events.

use crate::config::LensConfig;
use crate::decoration::aggregate::FolderAggregator;
use crate::decoration::cache::CacheStore;
use crate::decoration::counter::LineCounter;
use crate::decoration::format::Decoration;
use crate::decoration::inflight::InFlightRegistry;
use crate::decoration::scheduler::{HostMessage, LensNotification, RefreshScheduler};
use crate::workspace::source::{FileQuery, FileSource, LocalFs};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Events the host forwards to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A file or folder appeared.
    Created(PathBuf),
    /// A file or folder was removed.
    Deleted(PathBuf),
    /// A file was written.
    Saved(PathBuf),
    /// The set of files open in editors changed.
    VisibleEditorsChanged(Vec<PathBuf>),
    /// The workspace roots were replaced.
    WorkspaceFoldersChanged(Vec<PathBuf>),
}

/// Orchestrates caches, counters and the refresh scheduler.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DecorationEngine {
    config: Arc<LensConfig>,
    source: Arc<dyn FileSource>,
    caches: Arc<CacheStore>,
    counter: Arc<LineCounter>,
    aggregator: Arc<FolderAggregator>,
    file_flights: Arc<InFlightRegistry>,
    folder_flights: Arc<InFlightRegistry>,
    scheduler: Arc<RefreshScheduler>,
    roots: Arc<RwLock<Vec<PathBuf>>>,
    initializing: Arc<AtomicBool>,
}

impl DecorationEngine {
    /// Creates a new engine.
    ///
    /// # Returns
    /// A tuple of (engine, receiver) where receiver gets host notifications.
    pub fn new(
        config: LensConfig,
        source: Arc<dyn FileSource>,
        roots: Vec<PathBuf>,
        buffer_size: usize,
    ) -> (Self, broadcast::Receiver<LensNotification>) {
        let config = Arc::new(config);
        let caches = Arc::new(CacheStore::new(config.cache_capacity));
        let counter = Arc::new(LineCounter::new(
            Arc::clone(&source),
            Arc::clone(&caches),
            Arc::clone(&config),
        ));
        let aggregator = Arc::new(FolderAggregator::new(
            Arc::clone(&counter),
            Arc::clone(&source),
            Arc::clone(&caches),
            Arc::clone(&config),
        ));
        let (notifier, receiver) = broadcast::channel(buffer_size.max(1));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&caches),
            notifier,
            config.debounce_delay,
        ));

        (
            Self {
                config,
                source,
                caches,
                counter,
                aggregator,
                file_flights: Arc::new(InFlightRegistry::new("file")),
                folder_flights: Arc::new(InFlightRegistry::new("folder")),
                scheduler,
                roots: Arc::new(RwLock::new(roots)),
                initializing: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        )
    }

    /// Active configuration.
    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    /// Shared cache store.
    pub fn caches(&self) -> &CacheStore {
        &self.caches
    }

    /// Refresh scheduler feeding host notifications.
    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Current workspace roots.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.read().clone()
    }

    /// Subscribe to host notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LensNotification> {
        self.scheduler.subscribe()
    }

    /// Count lines in one file, joining any in-flight count for it.
    pub async fn count(&self, path: &Path) -> u64 {
        self.join_file_count(path).await
    }

    /// Decoration for `path`, or `None` if it has none (yet).
    ///
    /// Never performs folder aggregation inline: an uncached folder starts a
    /// background computation and answers `None`; the host hears about the
    /// result through a `DecorationsChanged` notification. File counts are
    /// awaited.
    pub async fn decoration_for(&self, path: &Path) -> Option<Decoration> {
        if let Some(decoration) = self.caches.decoration(path) {
            return Some(decoration);
        }

        let stat = match self.source.stat(path).await {
            Ok(stat) => stat,
            Err(e) => {
                tracing::warn!("Failed to stat {} for decoration: {}", path.display(), e);
                return None;
            }
        };

        if stat.is_dir {
            return self.folder_decoration(path);
        }
        if !stat.is_file || self.config.should_skip_file(path, Some(stat.size)) {
            return None;
        }

        if stat.size == 0 {
            let decoration = Decoration::file(0);
            self.caches.record_count(path, 0, 0);
            self.caches.set_decoration(path, decoration.clone());
            return Some(decoration);
        }

        if let Some(lines) = self.caches.fresh_line_count(path, stat.size) {
            let decoration = self.file_decoration(lines, stat.size);
            self.caches.set_decoration(path, decoration.clone());
            return Some(decoration);
        }

        self.caches.set_size(path, stat.size);

        if self.config.is_oversized(stat.size) {
            let estimate = self.config.estimate(stat.size);
            let decoration = Decoration::estimated(estimate);
            self.caches.set_line_count(path, estimate);
            self.caches.set_decoration(path, decoration.clone());
            return Some(decoration);
        }

        let lines = self.join_file_count(path).await;
        let decoration = Decoration::file(lines);
        self.caches.set_decoration(path, decoration.clone());
        Some(decoration)
    }

    fn file_decoration(&self, lines: u64, size: u64) -> Decoration {
        if self.config.is_oversized(size) {
            Decoration::estimated(lines)
        } else {
            Decoration::file(lines)
        }
    }

    fn folder_decoration(&self, path: &Path) -> Option<Decoration> {
        if self.config.should_skip_folder(path) {
            return None;
        }

        if let Some(total) = self.caches.folder_total(path) {
            let decoration = Decoration::folder(total);
            self.caches.set_decoration(path, decoration.clone());
            return Some(decoration);
        }

        let aggregator = Arc::clone(&self.aggregator);
        let owned = path.to_path_buf();
        let flight = self
            .folder_flights
            .join(path, move || async move { aggregator.try_aggregate(&owned).await });

        if flight.is_leader() {
            let caches = Arc::clone(&self.caches);
            let scheduler = Arc::clone(&self.scheduler);
            let owned = path.to_path_buf();
            tokio::spawn(async move {
                let total = flight.wait().await;
                caches.set_decoration(&owned, Decoration::folder(total));
                scheduler.request_update(vec![owned], false);
            });
        }

        None
    }

    async fn join_file_count(&self, path: &Path) -> u64 {
        let counter = Arc::clone(&self.counter);
        let owned = path.to_path_buf();
        self.file_flights
            .get_or_compute(path, move || async move { counter.try_count(&owned).await })
            .await
    }

    /// React to a host file-system or workspace event.
    ///
    /// Changes inside skip-listed directories (`.git`, `target`, ...) are
    /// dropped before they touch any cache. Must be called from within a
    /// tokio runtime: refreshes are scheduled on spawned timer tasks.
    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::Created(path) | HostEvent::Saved(path) | HostEvent::Deleted(path)
                if self.in_skipped_folder(&path) =>
            {
                tracing::trace!("Ignoring change in skipped folder: {}", path.display());
            }
            HostEvent::Created(path) => {
                if self.config.should_skip_file(&path, None) {
                    return;
                }
                let delay = self.event_delay(&path);
                self.caches.invalidate_ancestors(&path);
                let mut paths = vec![path.clone()];
                paths.extend(path.parent().map(Path::to_path_buf));
                self.scheduler.request_update_after(paths, true, delay);
            }
            HostEvent::Deleted(path) => {
                let delay = self.event_delay(&path);
                self.caches.remove_file(&path);
                self.caches.invalidate_ancestors(&path);
                if let Some(parent) = path.parent() {
                    self.scheduler
                        .request_update_after(vec![parent.to_path_buf()], true, delay);
                }
            }
            HostEvent::Saved(path) => {
                if self.config.should_skip_file(&path, None) {
                    return;
                }
                self.caches.invalidate_ancestors(&path);
                let mut paths = vec![path.clone()];
                paths.extend(path.parent().map(Path::to_path_buf));
                self.scheduler
                    .request_update_after(paths, true, self.config.save_delay);
            }
            HostEvent::VisibleEditorsChanged(paths) => {
                let paths: Vec<PathBuf> = paths
                    .into_iter()
                    .filter(|path| {
                        !self.config.should_skip_file(path, None) && !self.in_skipped_folder(path)
                    })
                    .collect();
                if paths.is_empty() {
                    return;
                }
                for path in &paths {
                    self.caches.invalidate_ancestors(path);
                }
                self.scheduler
                    .request_update_after(paths, true, self.config.visible_editor_delay);
            }
            HostEvent::WorkspaceFoldersChanged(roots) => {
                *self.roots.write() = roots;
                self.reset();
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.initialize().await;
                });
            }
        }
    }

    /// Whether `path` lies in a skip-listed directory below its workspace
    /// root. Segments above the root (a checkout under `~/build/`) don't count.
    fn in_skipped_folder(&self, path: &Path) -> bool {
        let roots = self.roots.read();
        let relative = roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        self.config.should_skip_folder(relative)
    }

    /// High-priority files refresh on the default debounce, the rest later.
    fn event_delay(&self, path: &Path) -> Duration {
        if self.config.is_high_priority(path) {
            self.config.debounce_delay
        } else {
            self.config.low_priority_delay
        }
    }

    /// Clear all caches and tell the host to re-query everything.
    pub fn reset(&self) {
        tracing::info!("Resetting line-count caches: {}", self.caches.debug_summary());
        self.caches.reset();
        self.scheduler.notify(LensNotification::RefreshAll);
    }

    /// Manual refresh: clear everything and rescan the workspace.
    pub async fn refresh_all(&self) {
        self.reset();
        self.initialize().await;
    }

    /// Scan every workspace root and push refreshes in priority-ordered
    /// batches, so badges fill in progressively.
    ///
    /// Waits `initial_scan_delay` first. Returns immediately if a scan is
    /// already running.
    pub async fn initialize(&self) {
        if self.initializing.swap(true, Ordering::SeqCst) {
            tracing::debug!("Initialization already running");
            return;
        }

        let roots = self.roots();
        if roots.is_empty() {
            self.scheduler.notify(LensNotification::Message(HostMessage::Info(
                "LineLens: no workspace folder is open".to_string(),
            )));
            self.initializing.store(false, Ordering::SeqCst);
            return;
        }

        self.scheduler.notify(LensNotification::Message(HostMessage::Info(
            "LineLens is counting lines in your files...".to_string(),
        )));
        self.scheduler.notify(LensNotification::Message(HostMessage::Status(
            "LineLens: Initializing...".to_string(),
        )));

        tokio::time::sleep(self.config.initial_scan_delay).await;

        self.scheduler.set_bulk(true);
        for root in &roots {
            for tier in &self.config.scan_tiers {
                let query = FileQuery {
                    root: root.clone(),
                    extensions: tier.extensions.clone(),
                    exclude_dirs: self.config.skipped_folders.clone(),
                    max_results: tier.max_files,
                };
                match self.source.find_files(&query).await {
                    Ok(files) => {
                        self.process_batches(&files, tier.batch_size, tier.batch_delay)
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to initialize {}: {}", root.display(), e);
                    }
                }
            }
        }
        self.scheduler.set_bulk(false);
        self.initializing.store(false, Ordering::SeqCst);

        tracing::info!("Initialization finished: {}", self.caches.debug_summary());
        self.scheduler.notify(LensNotification::Message(HostMessage::Info(
            "LineLens is ready!".to_string(),
        )));
    }

    async fn process_batches(&self, files: &[PathBuf], batch_size: usize, delay: Duration) {
        for (index, batch) in files.chunks(batch_size.max(1)).enumerate() {
            let done = index * batch_size.max(1);
            if done > 0 && done % 1000 == 0 {
                self.scheduler.notify(LensNotification::Message(HostMessage::Status(format!(
                    "LineLens: Processing files ({}/{})...",
                    done,
                    files.len()
                ))));
            }
            self.scheduler.request_update(batch.to_vec(), true);
            tokio::time::sleep(delay).await;
        }
    }

    /// Whether an initialization scan is running.
    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// Drop all state and cancel pending notifications.
    pub fn dispose(&self) {
        self.scheduler.shutdown();
        self.caches.reset();
    }
}

/// Builder for DecorationEngine with sensible defaults.
pub struct DecorationEngineBuilder {
    config: LensConfig,
    source: Arc<dyn FileSource>,
    roots: Vec<PathBuf>,
    buffer_size: usize,
}

impl DecorationEngineBuilder {
    /// Builder with default config, local files and no roots.
    pub fn new() -> Self {
        Self {
            config: LensConfig::default(),
            source: Arc::new(LocalFs),
            roots: Vec::new(),
            buffer_size: 256,
        }
    }

    /// Replace the configuration.
    pub fn config(mut self, config: LensConfig) -> Self {
        self.config = config;
        self
    }

    /// Read files through `source` instead of the local disk.
    pub fn source(mut self, source: Arc<dyn FileSource>) -> Self {
        self.source = source;
        self
    }

    /// Add a workspace root.
    pub fn root(mut self, root: PathBuf) -> Self {
        self.roots.push(root);
        self
    }

    /// Replace the workspace roots.
    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    /// Notification channel capacity.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Build the engine and its first notification receiver.
    pub fn build(self) -> (DecorationEngine, broadcast::Receiver<LensNotification>) {
        DecorationEngine::new(self.config, self.source, self.roots, self.buffer_size)
    }
}

impl Default for DecorationEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
