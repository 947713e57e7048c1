//! Error types for directory walking.

use rusty_fsops_common::SysError;
use thiserror::Error;

/// Errors raised while opening or advancing a [`crate::DirectoryWalker`].
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// A system call failed or was cancelled.
    #[error(transparent)]
    Sys(#[from] SysError),

    /// The walk root is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The offending root path.
        path: String,
    },

    /// The walk root lives on a different filesystem than expected.
    #[error("{path}: filesystem source mismatch (expected {expected}, got {actual})")]
    SourceMismatch {
        /// The walk root.
        path: String,
        /// Source the caller asked for.
        expected: String,
        /// Source found in the mount table.
        actual: String,
    },

    /// The mount holding the walk root is missing from the mount table.
    #[error("{path}: mount {mnt_id} not found in mount table")]
    MountNotFound {
        /// The walk root.
        path: String,
        /// Mount id reported by statx (0 if unknown).
        mnt_id: u64,
    },

    /// Descending would exceed the depth limit.
    #[error("max depth {max_depth} exceeded at {path}")]
    DepthExceeded {
        /// The configured limit.
        max_depth: usize,
        /// Directory that could not be entered.
        path: String,
    },

    /// A checkpoint inode was not found in its directory.
    #[error("Failed to restore iterator position at depth {depth} in directory: {path}")]
    RestoreFailed {
        /// Index of the checkpoint frame that could not be matched.
        depth: usize,
        /// Directory that was searched.
        path: String,
    },

    /// A checkpoint frame below the root carries no inode, or the checkpoint
    /// is deeper than the depth limit.
    #[error("invalid checkpoint frame at depth {depth}")]
    InvalidCheckpoint {
        /// Index of the offending frame.
        depth: usize,
    },

    /// `skip()` called when the last yielded item was not a directory.
    #[error("skip() can only be called when the last yielded item was a directory")]
    SkipNotDirectory,

    /// The reporting callback asked to stop.
    #[error("reporting callback aborted the walk after {count} entries")]
    ReportingAborted {
        /// Entries yielded when the callback fired.
        count: u64,
    },
}

impl FileSystemError {
    /// Whether the walk cannot continue after this error.
    ///
    /// Only usage errors leave the walker usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SkipNotDirectory)
    }

    /// Whether the error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Sys(err) if err.is_cancelled())
    }
}
