//! Folder totals.

use crate::config::LensConfig;
use crate::decoration::cache::CacheStore;
use crate::decoration::counter::LineCounter;
use crate::error::Result;
use crate::workspace::source::{FileQuery, FileSource};
use std::path::Path;
use std::sync::Arc;

/// Sums line counts of the code files under a directory.
///
/// Files are counted in fixed-size batches: counts within a batch run
/// concurrently, batches run one after another, so at most `batch_size`
/// files are open at once.
pub struct FolderAggregator {
    counter: Arc<LineCounter>,
    source: Arc<dyn FileSource>,
    caches: Arc<CacheStore>,
    config: Arc<LensConfig>,
}

impl FolderAggregator {
    /// Creates an aggregator counting through `counter`.
    pub fn new(
        counter: Arc<LineCounter>,
        source: Arc<dyn FileSource>,
        caches: Arc<CacheStore>,
        config: Arc<LensConfig>,
    ) -> Self {
        Self {
            counter,
            source,
            caches,
            config,
        }
    }

    /// Total lines under `dir`; 0 on error or for skip-listed folders.
    pub async fn aggregate(&self, dir: &Path) -> u64 {
        match self.try_aggregate(dir).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!("Failed to count folder {}: {}", dir.display(), e);
                0
            }
        }
    }

    /// Total lines under `dir`, reporting enumeration failures. Skip-listed
    /// folders yield 0 and leave no cache entry.
    pub async fn try_aggregate(&self, dir: &Path) -> Result<u64> {
        if self.config.should_skip_folder(dir) {
            return Ok(0);
        }

        let query = FileQuery {
            root: dir.to_path_buf(),
            extensions: self.config.code_extensions.clone(),
            exclude_dirs: self.config.skipped_folders.clone(),
            max_results: self.config.max_folder_files,
        };
        let files = self.source.find_files(&query).await?;
        if files.len() >= self.config.max_folder_files {
            tracing::debug!(
                "Folder {} truncated at {} files",
                dir.display(),
                self.config.max_folder_files
            );
        }

        let mut total = 0u64;
        for batch in files.chunks(self.config.batch_size.max(1)) {
            let counts =
                futures::future::join_all(batch.iter().map(|file| self.counter.count(file))).await;
            total += counts.into_iter().sum::<u64>();
        }

        self.caches.set_folder_total(dir, total);
        tracing::debug!("Folder {} totals {} lines over {} files", dir.display(), total, files.len());
        Ok(total)
    }
}
