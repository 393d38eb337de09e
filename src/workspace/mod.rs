//! Workspace access: file primitives and file watching.

pub mod source;
pub mod watcher;

pub use source::{ContentStream, FileQuery, FileSource, FileStat, LocalFs};
pub use watcher::{FileChangeEvent, FileChangeKind, WorkspaceWatcher};
