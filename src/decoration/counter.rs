//! Line counting for a single file.

use crate::config::LensConfig;
use crate::decoration::cache::CacheStore;
use crate::error::{LensError, Result};
use crate::workspace::source::FileSource;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Computes exact (or, past the size limit, estimated) line counts and keeps
/// the size/count caches current.
pub struct LineCounter {
    source: Arc<dyn FileSource>,
    caches: Arc<CacheStore>,
    config: Arc<LensConfig>,
}

impl LineCounter {
    /// Creates a counter reading through `source`.
    pub fn new(source: Arc<dyn FileSource>, caches: Arc<CacheStore>, config: Arc<LensConfig>) -> Self {
        Self {
            source,
            caches,
            config,
        }
    }

    /// Count lines in `path`. Never fails: errors are logged and count as 0.
    pub async fn count(&self, path: &Path) -> u64 {
        match self.try_count(path).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("Failed to count lines in {}: {}", path.display(), e);
                0
            }
        }
    }

    /// Count lines in `path`, reporting I/O failures.
    ///
    /// A size that matches the cached size is trusted: the cached count is
    /// returned without reading.
    pub async fn try_count(&self, path: &Path) -> Result<u64> {
        let stat = match self.source.stat(path).await {
            Ok(stat) => stat,
            Err(e) => {
                self.caches.forget_count(path);
                return Err(LensError::io(path, e));
            }
        };
        if !stat.is_file {
            return Ok(0);
        }

        if let Some(lines) = self.caches.fresh_line_count(path, stat.size) {
            return Ok(lines);
        }

        self.caches.set_size(path, stat.size);

        if stat.size == 0 {
            self.caches.set_line_count(path, 0);
            return Ok(0);
        }

        if self.config.is_oversized(stat.size) {
            let estimate = self.config.estimate(stat.size);
            tracing::debug!("Estimated {} lines for {} ({} bytes)", estimate, path.display(), stat.size);
            self.caches.set_line_count(path, estimate);
            return Ok(estimate);
        }

        if self.config.is_binary(path) {
            self.caches.set_line_count(path, 0);
            return Ok(0);
        }

        let lines = self.read_lines(path).await?;
        self.caches.set_line_count(path, lines);
        Ok(lines)
    }

    async fn read_lines(&self, path: &Path) -> Result<u64> {
        let mut stream = self
            .source
            .open(path)
            .await
            .map_err(|e| LensError::io(path, e))?;
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        let mut tally = LineTally::default();

        loop {
            let read = stream
                .read(&mut buf)
                .await
                .map_err(|e| LensError::io(path, e))?;
            if read == 0 {
                break;
            }
            tally.feed(&buf[..read]);
        }

        Ok(tally.finish())
    }
}

/// Streaming newline counter that also counts a trailing partial line.
#[derive(Debug, Default)]
struct LineTally {
    newlines: u64,
    last_byte: Option<u8>,
}

impl LineTally {
    fn feed(&mut self, chunk: &[u8]) {
        self.newlines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        if let Some(&last) = chunk.last() {
            self.last_byte = Some(last);
        }
    }

    fn finish(self) -> u64 {
        match self.last_byte {
            Some(b'\n') | None => self.newlines,
            Some(_) => self.newlines + 1,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::workspace::source::{ContentStream, FileQuery, FileStat, LocalFs};
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// `LocalFs` that counts stream opens.
    #[derive(Default)]
    pub(crate) struct CountingFs {
        pub opens: AtomicUsize,
    }

    impl CountingFs {
        pub fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FileSource for CountingFs {
        async fn stat(&self, path: &Path) -> std::io::Result<FileStat> {
            LocalFs.stat(path).await
        }

        async fn open(&self, path: &Path) -> std::io::Result<ContentStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            LocalFs.open(path).await
        }

        async fn find_files(&self, query: &FileQuery) -> Result<Vec<PathBuf>> {
            LocalFs.find_files(query).await
        }
    }

    /// Reports any size for any path without touching disk.
    pub(crate) struct SizedFs {
        pub size: u64,
        pub opens: AtomicUsize,
    }

    #[async_trait]
    impl FileSource for SizedFs {
        async fn stat(&self, _path: &Path) -> std::io::Result<FileStat> {
            Ok(FileStat {
                is_file: true,
                is_dir: false,
                size: self.size,
            })
        }

        async fn open(&self, _path: &Path) -> std::io::Result<ContentStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(std::io::Cursor::new(Vec::<u8>::new())))
        }

        async fn find_files(&self, _query: &FileQuery) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    fn counter_with(source: Arc<dyn FileSource>, config: LensConfig) -> (LineCounter, Arc<CacheStore>) {
        let caches = Arc::new(CacheStore::new(1000));
        let counter = LineCounter::new(source, Arc::clone(&caches), Arc::new(config));
        (counter, caches)
    }

    #[test]
    fn test_tally_trailing_partial_line() {
        let mut tally = LineTally::default();
        tally.feed(b"a\nb");
        tally.feed(b"\nc");
        assert_eq!(tally.finish(), 3);

        let mut tally = LineTally::default();
        tally.feed(b"a\nb\nc\n");
        assert_eq!(tally.finish(), 3);

        assert_eq!(LineTally::default().finish(), 0);
    }

    #[tokio::test]
    async fn test_counts_with_and_without_trailing_newline() {
        let temp = tempfile::tempdir().unwrap();
        let fs_source = Arc::new(CountingFs::default());
        let (counter, _) = counter_with(fs_source.clone(), LensConfig::default());

        let open_ended = temp.path().join("a.txt");
        fs::write(&open_ended, "a\nb\nc").unwrap();
        assert_eq!(counter.count(&open_ended).await, 3);

        let terminated = temp.path().join("b.txt");
        fs::write(&terminated, "a\nb\nc\n").unwrap();
        assert_eq!(counter.count(&terminated).await, 3);
    }

    #[tokio::test]
    async fn test_small_chunks_span_boundaries() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.rs");
        fs::write(&path, "one\ntwo\nthree\nfour").unwrap();

        let config = LensConfig {
            read_chunk_size: 3,
            ..LensConfig::default()
        };
        let (counter, _) = counter_with(Arc::new(LocalFs), config);
        assert_eq!(counter.count(&path).await, 4);
    }

    #[tokio::test]
    async fn test_empty_file_is_zero_without_read() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("empty.rs");
        fs::write(&path, "").unwrap();

        let fs_source = Arc::new(CountingFs::default());
        let (counter, caches) = counter_with(fs_source.clone(), LensConfig::default());

        assert_eq!(counter.count(&path).await, 0);
        assert_eq!(fs_source.opens(), 0);
        assert_eq!(caches.line_count(&path), Some(0));
        assert_eq!(caches.size(&path), Some(0));
    }

    #[tokio::test]
    async fn test_repeat_count_is_served_from_cache() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.py");
        fs::write(&path, "x = 1\ny = 2\n").unwrap();

        let fs_source = Arc::new(CountingFs::default());
        let (counter, _) = counter_with(fs_source.clone(), LensConfig::default());

        assert_eq!(counter.count(&path).await, 2);
        assert_eq!(counter.count(&path).await, 2);
        assert_eq!(fs_source.opens(), 1);
    }

    #[tokio::test]
    async fn test_size_change_forces_recount() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.py");
        fs::write(&path, "x = 1\n").unwrap();

        let fs_source = Arc::new(CountingFs::default());
        let (counter, _) = counter_with(fs_source.clone(), LensConfig::default());

        assert_eq!(counter.count(&path).await, 1);
        fs::write(&path, "x = 1\ny = 2\nz = 3\n").unwrap();
        assert_eq!(counter.count(&path).await, 3);
        assert_eq!(fs_source.opens(), 2);
    }

    #[tokio::test]
    async fn test_oversized_file_is_estimated() {
        let source = Arc::new(SizedFs {
            size: 6_000_000,
            opens: AtomicUsize::new(0),
        });
        let (counter, caches) = counter_with(source.clone(), LensConfig::default());
        let path = Path::new("/virtual/huge.log");

        assert_eq!(counter.count(path).await, 120_000);
        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
        assert_eq!(caches.line_count(path), Some(120_000));
    }

    #[tokio::test]
    async fn test_binary_extension_is_zero_without_read() {
        let source = Arc::new(SizedFs {
            size: 2048,
            opens: AtomicUsize::new(0),
        });
        let (counter, _) = counter_with(source.clone(), LensConfig::default());

        assert_eq!(counter.count(Path::new("/virtual/logo.png")).await, 0);
        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_zero_and_forgotten() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("gone.rs");
        let (counter, caches) = counter_with(Arc::new(LocalFs), LensConfig::default());
        caches.record_count(&path, 10, 4);

        assert_eq!(counter.count(&path).await, 0);
        assert!(counter.try_count(&path).await.is_err());
        assert_eq!(caches.line_count(&path), None);
        assert_eq!(caches.size(&path), None);
    }

    #[tokio::test]
    async fn test_directory_counts_zero() {
        let temp = tempfile::tempdir().unwrap();
        let (counter, _) = counter_with(Arc::new(LocalFs), LensConfig::default());
        assert_eq!(counter.count(temp.path()).await, 0);
    }
}
