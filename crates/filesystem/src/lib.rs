//! Filesystem walking for rusty-fsops.
//!
//! This crate provides a depth-first walker that is safe against symlink
//! and mount-boundary tricks and can resume from a saved position:
//! - `DirectoryWalker` - Iterator over visited files and directories
//! - `WalkOptions` - Root selection, filters, reporting and resume options
//! - `EntryMetadata` - `statx` data for each entry
//! - `mount_source()` - Mount table lookup used to pin the walk to a filesystem

#[cfg(not(target_os = "linux"))]
compile_error!("rusty-fsops-filesystem requires Linux (openat2, statx)");

pub mod error;
pub mod metadata;
pub mod mount;
pub mod options;
pub mod sys;
pub mod walker;

// Re-export main types
pub use error::FileSystemError;
pub use metadata::{EntryMetadata, FileKind, Timestamp};
pub use mount::mount_source;
pub use options::{WalkOptions, DEFAULT_FILE_OPEN_FLAGS};
pub use walker::{DirStackEntry, DirectoryWalker, WalkEntry, WalkProgress, WalkStats};
