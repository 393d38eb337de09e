//! Line-count decorations.
//!
//! This module provides:
//! - `counter`: exact or estimated line count for one file
//! - `aggregate`: batched folder totals
//! - `cache`: the size / count / folder / decoration caches
//! - `inflight`: per-path computation dedup
//! - `scheduler`: debounced, batched host notifications
//! - `engine`: the query and event surface the host talks to

/// Folder totals.
pub mod aggregate;
/// Size, count, total and decoration caches.
pub mod cache;
/// Per-file line counting.
pub mod counter;
/// The engine tying the parts together.
pub mod engine;
/// Badge and tooltip formatting.
pub mod format;
/// Per-path computation dedup.
pub mod inflight;
/// Debounced refresh notifications.
pub mod scheduler;

pub use aggregate::FolderAggregator;
pub use cache::{CacheStats, CacheStore};
pub use counter::LineCounter;
pub use engine::{DecorationEngine, DecorationEngineBuilder, HostEvent};
pub use format::{format_line_count, Decoration};
pub use inflight::{Flight, InFlightRegistry};
pub use scheduler::{HostMessage, LensNotification, RefreshScheduler, SchedulerState};
