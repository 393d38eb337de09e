//! Engine configuration.
//!
//! These are fixed tuning constants, not end-user settings. `LensConfig::default()`
//! carries the values the badges were tuned with; tests shrink them.

use std::path::{Component, Path};
use std::time::Duration;

/// Directory names (or `/`-joined segment runs) whose subtrees are never counted.
pub const SKIPPED_FOLDERS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "out",
    "bin",
    "obj",
    ".vscode",
    ".idea",
    ".vs",
    "vendor",
    "coverage",
    ".next",
    ".nuxt",
    "public/assets",
    "static/assets",
    "target",
    ".sass-cache",
    ".cache",
];

/// Binary and media extensions that are never read.
pub const SKIP_EXTENSIONS: &[&str] = &[
    "exe", "dll", "obj", "bin", "jpg", "jpeg", "png", "gif", "mp3", "mp4", "zip", "gz", "tar",
    "pdf", "class", "pyc", "pyd", "so", "dylib", "o", "a", "lib", "woff", "woff2", "ttf", "eot",
    "svg", "ico", "bmp", "tiff", "webp",
];

/// Extensions classified as code for folder aggregation.
pub const CODE_FILE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "html", "css", "scss", "less", "go", "py", "java", "c", "cpp", "cs",
    "php", "rb", "rs", "json", "yaml", "yml", "xml", "md", "txt",
];

/// Code extensions scanned first during initialization.
pub const HIGH_PRIORITY_EXTENSIONS: &[&str] =
    &["js", "jsx", "ts", "tsx", "py", "java", "c", "cpp", "cs", "go"];

/// How one priority tier of the initialization scan is paced.
#[derive(Debug, Clone)]
pub struct ScanTier {
    /// Extensions enumerated in this tier.
    pub extensions: Vec<String>,
    /// Maximum files enumerated per workspace root.
    pub max_files: usize,
    /// Files refreshed per notification batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
}

/// Tuning constants for the decoration engine.
#[derive(Debug, Clone)]
pub struct LensConfig {
    /// Files larger than this (bytes) are estimated instead of read.
    pub size_limit: u64,
    /// Concurrent line counts per folder-aggregation batch.
    pub batch_size: usize,
    /// Quiet period before a batched change notification fires.
    pub debounce_delay: Duration,
    /// Delay before the initialization scan starts.
    pub initial_scan_delay: Duration,
    /// Bytes per estimated line for oversized files.
    pub estimation_factor: u64,
    /// Maximum files considered per folder aggregate.
    pub max_folder_files: usize,
    /// Maximum entries per cache map before LRU eviction.
    pub cache_capacity: usize,
    /// Read buffer size when streaming file contents.
    pub read_chunk_size: usize,
    /// Refresh delay after a document save.
    pub save_delay: Duration,
    /// Refresh delay after the visible editor set changes.
    pub visible_editor_delay: Duration,
    /// Refresh delay for create/delete of low-priority files.
    pub low_priority_delay: Duration,
    /// Directory names whose subtrees are never counted.
    pub skipped_folders: Vec<String>,
    /// Binary and media extensions that are never read.
    pub skip_extensions: Vec<String>,
    /// Extensions that count toward folder totals.
    pub code_extensions: Vec<String>,
    /// Extensions refreshed on the short delay and scanned first.
    pub high_priority_extensions: Vec<String>,
    /// Initialization tiers, scanned in order.
    pub scan_tiers: Vec<ScanTier>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

impl Default for LensConfig {
    fn default() -> Self {
        let high = owned(HIGH_PRIORITY_EXTENSIONS);
        let low: Vec<String> = CODE_FILE_EXTENSIONS
            .iter()
            .filter(|ext| !HIGH_PRIORITY_EXTENSIONS.contains(ext))
            .map(|ext| (*ext).to_string())
            .collect();

        Self {
            size_limit: 5_000_000,
            batch_size: 200,
            debounce_delay: Duration::from_millis(300),
            initial_scan_delay: Duration::from_millis(5000),
            estimation_factor: 50,
            max_folder_files: 10_000,
            cache_capacity: 100_000,
            read_chunk_size: 128 * 1024,
            save_delay: Duration::from_millis(150),
            visible_editor_delay: Duration::from_millis(100),
            low_priority_delay: Duration::from_millis(500),
            skipped_folders: owned(SKIPPED_FOLDERS),
            skip_extensions: owned(SKIP_EXTENSIONS),
            code_extensions: owned(CODE_FILE_EXTENSIONS),
            high_priority_extensions: high.clone(),
            scan_tiers: vec![
                ScanTier {
                    extensions: high,
                    max_files: 1000,
                    batch_size: 100,
                    batch_delay: Duration::from_millis(50),
                },
                ScanTier {
                    extensions: low,
                    max_files: 5000,
                    batch_size: 200,
                    batch_delay: Duration::from_millis(100),
                },
            ],
        }
    }
}

/// Lower-cased extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

impl LensConfig {
    /// Estimated line count for a file of `size` bytes.
    pub fn estimate(&self, size: u64) -> u64 {
        size / self.estimation_factor.max(1)
    }

    /// Whether `size` is past the exact-count threshold.
    pub fn is_oversized(&self, size: u64) -> bool {
        size > self.size_limit
    }

    /// Extension is on the binary/media deny-list.
    pub fn is_binary(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.skip_extensions.contains(&ext))
    }

    /// Extension is on the code allow-list.
    pub fn is_code_file(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.code_extensions.contains(&ext))
    }

    /// Extension is on the high-priority list.
    pub fn is_high_priority(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.high_priority_extensions.contains(&ext))
    }

    /// Whether a file gets no badge. The deny-list wins over the allow-list;
    /// unrecognized extensions are only skipped once they are oversized.
    pub fn should_skip_file(&self, path: &Path, size: Option<u64>) -> bool {
        if self.is_binary(path) {
            return true;
        }
        if self.is_code_file(path) {
            return false;
        }
        size.is_some_and(|size| self.is_oversized(size))
    }

    /// Whether `path` lies in (or is) a skip-listed directory.
    pub fn should_skip_folder(&self, path: &Path) -> bool {
        matches_skipped_folder(path, &self.skipped_folders)
    }
}

/// Whether any entry of `folders` appears in `path` as a run of whole path
/// segments, so `build` matches `/a/build/x` but not `/a/builder`, and
/// `public/assets` matches `/site/public/assets`.
pub fn matches_skipped_folder(path: &Path, folders: &[String]) -> bool {
    let segments: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    folders.iter().any(|folder| {
        let pattern: Vec<&str> = folder.split('/').filter(|s| !s.is_empty()).collect();
        !pattern.is_empty()
            && segments
                .windows(pattern.len())
                .any(|window| window == pattern.as_slice())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_match_tuning() {
        let config = LensConfig::default();
        assert_eq!(config.size_limit, 5_000_000);
        assert_eq!(config.estimation_factor, 50);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.scan_tiers.len(), 2);
        assert!(config.scan_tiers[1].extensions.contains(&"rs".to_string()));
        assert!(!config.scan_tiers[1].extensions.contains(&"ts".to_string()));
    }

    #[test]
    fn test_skip_folder_matches_segments() {
        let config = LensConfig::default();
        assert!(config.should_skip_folder(&PathBuf::from("/repo/node_modules")));
        assert!(config.should_skip_folder(&PathBuf::from("/repo/node_modules/pkg/src")));
        assert!(config.should_skip_folder(&PathBuf::from("/repo/public/assets/img")));
        assert!(!config.should_skip_folder(&PathBuf::from("/repo/builder")));
        assert!(!config.should_skip_folder(&PathBuf::from("/repo/public")));
        assert!(!config.should_skip_folder(&PathBuf::from("/repo/src")));
    }

    #[test]
    fn test_skip_file_rules() {
        let config = LensConfig::default();
        assert!(config.should_skip_file(Path::new("/a/logo.PNG"), Some(10)));
        assert!(!config.should_skip_file(Path::new("/a/main.rs"), Some(10)));
        assert!(!config.should_skip_file(Path::new("/a/main.rs"), Some(9_000_000)));
        assert!(!config.should_skip_file(Path::new("/a/Makefile"), Some(10)));
        assert!(config.should_skip_file(Path::new("/a/dump.log"), Some(9_000_000)));
    }

    #[test]
    fn test_estimate_is_floor() {
        let config = LensConfig::default();
        assert_eq!(config.estimate(6_000_000), 120_000);
        assert_eq!(config.estimate(10_000_049), 200_000);
    }
}
