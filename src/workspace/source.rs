//! File-system primitives the engine is built on.
//!
//! `FileSource` is the seam between the caching engine and the disk: stat,
//! streaming read, and filtered enumeration. `LocalFs` is the real thing;
//! tests wrap it to count reads.

use crate::error::{LensError, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// What a stat call tells us about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Regular file.
    pub is_file: bool,
    /// Directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// A filtered enumeration request.
#[derive(Debug, Clone)]
pub struct FileQuery {
    /// Directory to enumerate.
    pub root: PathBuf,
    /// Lower-case extensions (no dot) a file must carry to be returned.
    pub extensions: Vec<String>,
    /// Skip-listed directory names; matching subtrees are not descended.
    pub exclude_dirs: Vec<String>,
    /// Stop after this many matches.
    pub max_results: usize,
}

impl FileQuery {
    fn wants_dir(&self, relative: &Path) -> bool {
        !crate::config::matches_skipped_folder(relative, &self.exclude_dirs)
    }

    fn wants_file(&self, path: &Path) -> bool {
        crate::config::extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }
}

/// Stream type handed out by [`FileSource::open`].
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Low-level file access used by the counters and the engine.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Stat a path without reading its content.
    async fn stat(&self, path: &Path) -> std::io::Result<FileStat>;

    /// Open a path for streaming reads.
    async fn open(&self, path: &Path) -> std::io::Result<ContentStream>;

    /// Enumerate files matching `query`, in traversal order, capped at
    /// `query.max_results`.
    async fn find_files(&self, query: &FileQuery) -> Result<Vec<PathBuf>>;
}

/// [`FileSource`] backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

#[async_trait]
impl FileSource for LocalFs {
    async fn stat(&self, path: &Path) -> std::io::Result<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
            size: if metadata.is_file() { metadata.len() } else { 0 },
        })
    }

    async fn open(&self, path: &Path) -> std::io::Result<ContentStream> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn find_files(&self, query: &FileQuery) -> Result<Vec<PathBuf>> {
        let query = query.clone();
        let root = query.root.clone();
        tokio::task::spawn_blocking(move || walk(&query))
            .await
            .map_err(|e| LensError::TaskJoin(format!("walk of {}: {e}", root.display())))?
    }
}

/// Blocking traversal; runs on the blocking pool.
fn walk(query: &FileQuery) -> Result<Vec<PathBuf>> {
    if query.max_results == 0 {
        return Ok(Vec::new());
    }
    std::fs::metadata(&query.root).map_err(|e| LensError::io(&query.root, e))?;

    let root = query.root.clone();
    let filter_query = query.clone();
    let mut builder = WalkBuilder::new(&query.root);
    // Exclusions come from the skip-list only, not from ignore files.
    builder.standard_filters(false);
    builder.follow_links(false);
    builder.filter_entry(move |entry| {
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            return true;
        }
        let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
        filter_query.wants_dir(relative)
    });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let err = LensError::Walk {
                    root: query.root.clone(),
                    source,
                };
                tracing::debug!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if !query.wants_file(entry.path()) {
            continue;
        }
        files.push(entry.into_path());
        if files.len() >= query.max_results {
            break;
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::io::AsyncReadExt;

    fn query(root: &Path, max_results: usize) -> FileQuery {
        FileQuery {
            root: root.to_path_buf(),
            extensions: vec!["rs".into(), "md".into()],
            exclude_dirs: vec!["target".into(), "public/assets".into()],
            max_results,
        }
    }

    #[tokio::test]
    async fn test_stat_file_and_dir() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.rs");
        fs::write(&file, "fn main() {}\n").unwrap();

        let stat = LocalFs.stat(&file).await.unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, 13);

        let stat = LocalFs.stat(temp.path()).await.unwrap();
        assert!(stat.is_dir);
        assert_eq!(stat.size, 0);

        assert!(LocalFs.stat(&temp.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.md");
        fs::write(&file, "hello").unwrap();

        let mut stream = LocalFs.open(&file).await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello");
    }

    #[tokio::test]
    async fn test_find_files_filters_extensions_and_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::create_dir_all(root.join("public/assets")).unwrap();
        fs::write(root.join("src/lib.rs"), "x").unwrap();
        fs::write(root.join("README.md"), "x").unwrap();
        fs::write(root.join("logo.png"), "x").unwrap();
        fs::write(root.join("target/debug/gen.rs"), "x").unwrap();
        fs::write(root.join("public/assets/notes.md"), "x").unwrap();

        let mut files = LocalFs.find_files(&query(root, 100)).await.unwrap();
        files.sort();
        assert_eq!(files, vec![root.join("README.md"), root.join("src/lib.rs")]);
    }

    #[tokio::test]
    async fn test_find_files_respects_limit() {
        let temp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            fs::write(temp.path().join(format!("f{i}.rs")), "x").unwrap();
        }

        let files = LocalFs.find_files(&query(temp.path(), 3)).await.unwrap();
        assert_eq!(files.len(), 3);
        assert!(LocalFs.find_files(&query(temp.path(), 0)).await.unwrap().is_empty());
    }
}
