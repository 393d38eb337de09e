//! The four keyed caches behind the badges.
//!
//! `CacheStore` keeps file sizes, line counts, folder aggregates and rendered
//! decorations in bounded LRU maps. The maps share one lock so that a reset or
//! an invalidation walk is atomic from every caller's point of view.
//!
//! There is no cross-invalidation between maps except through
//! [`CacheStore::invalidate_ancestors`] and [`CacheStore::invalidate_path`];
//! callers decide which one matches the change they saw.

use crate::decoration::format::Decoration;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Counters for debugging/monitoring.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Decoration lookups served from cache.
    pub decoration_hits: u64,
    /// Decoration lookups that missed.
    pub decoration_misses: u64,
    /// Individual path invalidations (all four maps).
    pub path_invalidations: u64,
    /// Ancestor directories cleared by invalidation walks.
    pub ancestor_invalidations: u64,
    /// Full resets.
    pub resets: u64,
}

struct CacheMaps {
    sizes: LruCache<PathBuf, u64>,
    counts: LruCache<PathBuf, u64>,
    folders: LruCache<PathBuf, u64>,
    decorations: LruCache<PathBuf, Decoration>,
    stats: CacheStats,
}

/// Size, line-count, folder-aggregate and decoration caches.
pub struct CacheStore {
    maps: Mutex<CacheMaps>,
    capacity: usize,
}

impl CacheStore {
    /// Create a store whose maps each hold at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            maps: Mutex::new(CacheMaps {
                sizes: LruCache::new(cap),
                counts: LruCache::new(cap),
                folders: LruCache::new(cap),
                decorations: LruCache::new(cap),
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    /// Entries each map holds before evicting.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last observed size of `path`.
    pub fn size(&self, path: &Path) -> Option<u64> {
        self.maps.lock().sizes.get(path).copied()
    }

    /// Record the observed size of `path`.
    pub fn set_size(&self, path: &Path, size: u64) {
        self.maps.lock().sizes.put(path.to_path_buf(), size);
    }

    /// Cached line count, regardless of freshness.
    pub fn line_count(&self, path: &Path) -> Option<u64> {
        self.maps.lock().counts.get(path).copied()
    }

    /// Cache a line count for `path`.
    pub fn set_line_count(&self, path: &Path, lines: u64) {
        self.maps.lock().counts.put(path.to_path_buf(), lines);
    }

    /// Cached count, but only if the cached size still equals `size`.
    pub fn fresh_line_count(&self, path: &Path, size: u64) -> Option<u64> {
        let mut maps = self.maps.lock();
        if maps.sizes.get(path).copied() != Some(size) {
            return None;
        }
        maps.counts.get(path).copied()
    }

    /// Record a size and its count in one step.
    pub fn record_count(&self, path: &Path, size: u64, lines: u64) {
        let mut maps = self.maps.lock();
        maps.sizes.put(path.to_path_buf(), size);
        maps.counts.put(path.to_path_buf(), lines);
    }

    /// Drop the size and count of a path that could not be stat'd.
    pub fn forget_count(&self, path: &Path) {
        let mut maps = self.maps.lock();
        maps.sizes.pop(path);
        maps.counts.pop(path);
    }

    /// Cached aggregate for a folder.
    pub fn folder_total(&self, path: &Path) -> Option<u64> {
        self.maps.lock().folders.get(path).copied()
    }

    /// Cache a folder aggregate.
    pub fn set_folder_total(&self, path: &Path, lines: u64) {
        self.maps.lock().folders.put(path.to_path_buf(), lines);
    }

    /// Cached decoration; counts as a hit or a miss.
    pub fn decoration(&self, path: &Path) -> Option<Decoration> {
        let mut maps = self.maps.lock();
        let found = maps.decorations.get(path).cloned();
        if found.is_some() {
            maps.stats.decoration_hits += 1;
        } else {
            maps.stats.decoration_misses += 1;
        }
        found
    }

    /// Cache the decoration shown for `path`.
    pub fn set_decoration(&self, path: &Path, decoration: Decoration) {
        self.maps.lock().decorations.put(path.to_path_buf(), decoration);
    }

    /// Remove a file's own size, count and decoration (content changed or
    /// the file is gone).
    pub fn remove_file(&self, path: &Path) {
        let mut maps = self.maps.lock();
        maps.sizes.pop(path);
        maps.counts.pop(path);
        maps.decorations.pop(path);
    }

    /// Remove every entry keyed by `path`, in all four maps.
    pub fn invalidate_path(&self, path: &Path) {
        let mut maps = self.maps.lock();
        maps.sizes.pop(path);
        maps.counts.pop(path);
        maps.folders.pop(path);
        maps.decorations.pop(path);
        maps.stats.path_invalidations += 1;
    }

    /// Delete the folder aggregate and decoration of every ancestor directory
    /// of `path`, up to the file-system root. The entries of `path` itself are
    /// left alone.
    pub fn invalidate_ancestors(&self, path: &Path) {
        let mut maps = self.maps.lock();
        let mut current = path.parent();
        while let Some(dir) = current {
            maps.folders.pop(dir);
            maps.decorations.pop(dir);
            maps.stats.ancestor_invalidations += 1;
            current = dir.parent();
        }
    }

    /// Clear all four maps.
    pub fn reset(&self) {
        let mut maps = self.maps.lock();
        maps.sizes.clear();
        maps.counts.clear();
        maps.folders.clear();
        maps.decorations.clear();
        maps.stats.resets += 1;
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.maps.lock().stats.clone()
    }

    /// Get a summary of the store for debugging.
    pub fn debug_summary(&self) -> String {
        let maps = self.maps.lock();
        format!(
            "CacheStore: {} sizes, {} counts, {} folders, {} decorations (max: {}), stats: {:?}",
            maps.sizes.len(),
            maps.counts.len(),
            maps.folders.len(),
            maps.decorations.len(),
            self.capacity,
            maps.stats
        )
    }
}
