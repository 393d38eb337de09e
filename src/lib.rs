//! Line Lens
//!
//! Live line-count badges for file explorers. Every file gets a short badge
//! (`42`, `3H`, `12K`, `1M`) and every folder the total of the code files
//! under it, kept current as files are created, edited and deleted, without
//! ever stalling the UI that asks for them.
//!
//! ## How a badge is produced
//!
//! ```text
//! host query decoration_for(P)
//!        ↓
//! CacheStore (decoration hit?) ──yes──► badge
//!        ↓ no
//! stat(P) ── file ──► InFlightRegistry ──► LineCounter ──► cache ──► badge
//!        │
//!        └─ dir ──► InFlightRegistry ──► FolderAggregator [BACKGROUND]
//!                          ↓
//!                   RefreshScheduler (debounced batch)
//!                          ↓
//!                   DecorationsChanged ──► host re-queries
//! ```
//!
//! File-system events invalidate the changed path and every ancestor folder,
//! then schedule a batched refresh.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use line_lens::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = PathBuf::from("/path/to/repo");
//!     let (engine, rx) = DecorationEngineBuilder::new().root(root.clone()).build();
//!
//!     let mut view = BadgeViewBuilder::new(engine.clone())
//!         .on_badges_changed(Box::new(|changes| {
//!             for (path, decoration) in changes {
//!                 println!("{}: {:?}", path.display(), decoration);
//!             }
//!         }))
//!         .build();
//!     view.listen(rx);
//!     view.handle().show(&[root.clone()]).await;
//!
//!     let mut watcher = WorkspaceWatcher::new(200, 1000)?;
//!     watcher.watch(&root)?;
//!     line_lens::run_watcher_loop(&mut watcher, &engine, 50).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`config`]: tuning constants and skip rules
//! - [`decoration`]: caches, counters, dedup, scheduler and the engine
//! - [`workspace`]: file primitives and the file watcher
//! - [`ui`]: a host-side badge view

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod decoration;
pub mod error;
pub mod ui;
pub mod workspace;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::config::LensConfig;
    pub use crate::decoration::{
        format_line_count, Decoration, DecorationEngine, DecorationEngineBuilder, HostEvent,
        HostMessage, LensNotification,
    };
    pub use crate::error::LensError;
    pub use crate::ui::{BadgeView, BadgeViewBuilder, BadgeViewHandle};
    pub use crate::workspace::{FileSource, LocalFs, WorkspaceWatcher};
}

/// Run the file watcher event loop.
///
/// This function runs the loop that:
/// 1. Polls the file watcher for new events
/// 2. Flushes debounced events when ready
/// 3. Forwards them to the decoration engine
///
/// # Arguments
/// * `watcher` - The file watcher to poll
/// * `engine` - The engine to notify
/// * `poll_interval_ms` - How often to poll the watcher (default: 50ms)
pub async fn run_watcher_loop(
    watcher: &mut workspace::WorkspaceWatcher,
    engine: &decoration::DecorationEngine,
    poll_interval_ms: u64,
) {
    let poll_interval = std::time::Duration::from_millis(poll_interval_ms);

    loop {
        watcher.poll_events();
        for event in watcher.flush_if_ready() {
            engine.handle_event(event);
        }
        tokio::time::sleep(poll_interval).await;
    }
}
