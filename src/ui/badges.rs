//! Explorer-side badge view.
//!
//! `BadgeView` plays the host UI: it listens for engine notifications,
//! re-queries decorations for the paths that changed, and keeps the badges
//! it would render.

use crate::decoration::{Decoration, DecorationEngine, HostMessage, LensNotification};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Callback type for badge changes.
pub type BadgesChangedCallback = Box<dyn Fn(&[(PathBuf, Option<Decoration>)]) + Send + Sync>;

/// Callback type for user-visible messages.
pub type MessageCallback = Box<dyn Fn(&HostMessage) + Send + Sync>;

/// What the explorer currently shows.
#[derive(Debug, Clone, Default)]
pub struct BadgeViewState {
    /// Paths the explorer has on screen.
    pub visible: HashSet<PathBuf>,
    /// Rendered badges by path.
    pub badges: HashMap<PathBuf, Decoration>,
    /// Last status-bar text.
    pub status: Option<String>,
}

/// A cloneable handle onto the view state, for use in async contexts.
#[derive(Clone)]
pub struct BadgeViewHandle {
    engine: DecorationEngine,
    state: Arc<RwLock<BadgeViewState>>,
    changed_cb: Option<Arc<BadgesChangedCallback>>,
    message_cb: Option<Arc<MessageCallback>>,
}

impl BadgeViewHandle {
    fn new(engine: DecorationEngine) -> Self {
        Self {
            engine,
            state: Arc::new(RwLock::new(BadgeViewState::default())),
            changed_cb: None,
            message_cb: None,
        }
    }

    /// Put paths on screen and query their decorations.
    pub async fn show(&self, paths: &[PathBuf]) {
        {
            let mut state = self.state.write().await;
            state.visible.extend(paths.iter().cloned());
        }
        self.requery(paths).await;
    }

    /// Take paths off screen.
    pub async fn hide(&self, paths: &[PathBuf]) {
        let mut state = self.state.write().await;
        for path in paths {
            state.visible.remove(path);
            state.badges.remove(path);
        }
    }

    /// Re-query decorations for the visible subset of `paths`.
    pub async fn requery(&self, paths: &[PathBuf]) {
        let targets: Vec<PathBuf> = {
            let state = self.state.read().await;
            paths
                .iter()
                .filter(|p| state.visible.contains(*p))
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        let mut changes = Vec::with_capacity(targets.len());
        for path in targets {
            let decoration = self.engine.decoration_for(&path).await;
            changes.push((path, decoration));
        }

        {
            let mut state = self.state.write().await;
            for (path, decoration) in &changes {
                match decoration {
                    Some(decoration) => {
                        state.badges.insert(path.clone(), decoration.clone());
                    }
                    None => {
                        state.badges.remove(path);
                    }
                }
            }
        }

        if let Some(ref cb) = self.changed_cb {
            cb(changes.as_slice());
        }
    }

    /// Re-query every visible path.
    pub async fn requery_all(&self) {
        let visible: Vec<PathBuf> = self.state.read().await.visible.iter().cloned().collect();
        self.requery(&visible).await;
    }

    async fn show_message(&self, message: &HostMessage) {
        match message {
            HostMessage::Info(text) => tracing::info!("{}", text),
            HostMessage::Status(text) => {
                self.state.write().await.status = Some(text.clone());
            }
        }
        if let Some(ref cb) = self.message_cb {
            cb(message);
        }
    }

    /// Badge currently rendered for `path`.
    pub async fn badge(&self, path: &Path) -> Option<Decoration> {
        self.state.read().await.badges.get(path).cloned()
    }

    /// Last status-bar text received.
    pub async fn status(&self) -> Option<String> {
        self.state.read().await.status.clone()
    }
}

/// Explorer pane that keeps badges in sync with the engine.
pub struct BadgeView {
    handle: BadgeViewHandle,
    listener_handle: Option<tokio::task::JoinHandle<()>>,
}

impl BadgeView {
    /// Creates a view with nothing on screen.
    pub fn new(engine: DecorationEngine) -> Self {
        Self {
            handle: BadgeViewHandle::new(engine),
            listener_handle: None,
        }
    }

    /// Handle for driving the view.
    pub fn handle(&self) -> &BadgeViewHandle {
        &self.handle
    }

    /// Start listening for engine notifications in a background task.
    pub fn listen(&mut self, rx: broadcast::Receiver<LensNotification>) {
        let handle = self.handle.clone();
        self.listener_handle = Some(tokio::spawn(async move {
            Self::listener_loop(handle, rx).await;
        }));
    }

    async fn listener_loop(handle: BadgeViewHandle, mut rx: broadcast::Receiver<LensNotification>) {
        loop {
            match rx.recv().await {
                Ok(LensNotification::DecorationsChanged { paths }) => {
                    tracing::debug!("BadgeView received refresh for {} paths", paths.len());
                    handle.requery(&paths).await;
                }
                Ok(LensNotification::RefreshAll) => {
                    handle.requery_all().await;
                }
                Ok(LensNotification::Message(message)) => {
                    handle.show_message(&message).await;
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    tracing::warn!(
                        "BadgeView lagged behind by {} notifications, re-querying everything",
                        count
                    );
                    handle.requery_all().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Lens notification channel closed, stopping listener");
                    break;
                }
            }
        }
    }

    /// Stop the listener task.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Whether the listener task is running.
    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

/// Builder for BadgeView with optional callbacks.
pub struct BadgeViewBuilder {
    engine: DecorationEngine,
    changed_cb: Option<BadgesChangedCallback>,
    message_cb: Option<MessageCallback>,
}

impl BadgeViewBuilder {
    /// Builder for a view over `engine` with no callbacks.
    pub fn new(engine: DecorationEngine) -> Self {
        Self {
            engine,
            changed_cb: None,
            message_cb: None,
        }
    }

    /// Called with every batch of re-queried badges.
    pub fn on_badges_changed(mut self, cb: BadgesChangedCallback) -> Self {
        self.changed_cb = Some(cb);
        self
    }

    /// Called with every user-visible message.
    pub fn on_message(mut self, cb: MessageCallback) -> Self {
        self.message_cb = Some(cb);
        self
    }

    /// Build the view with the registered callbacks.
    pub fn build(self) -> BadgeView {
        let mut view = BadgeView::new(self.engine);
        view.handle.changed_cb = self.changed_cb.map(Arc::new);
        view.handle.message_cb = self.message_cb.map(Arc::new);
        view
    }
}
