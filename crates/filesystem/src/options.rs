//! Configuration for [`crate::DirectoryWalker`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rusty_fsops_common::{CancelToken, ProgressCallback, MAX_DEPTH};

use crate::walker::{DirStackEntry, WalkProgress};

/// Flags used to open non-directory entries when none are configured.
///
/// `O_NONBLOCK` keeps FIFOs and device nodes from blocking the walk.
pub const DEFAULT_FILE_OPEN_FLAGS: i32 = libc::O_RDONLY | libc::O_NOCTTY | libc::O_NONBLOCK;

/// Options for a directory walk.
#[derive(Clone)]
pub struct WalkOptions {
    /// Start below the mountpoint instead of at it. Resolved beneath the
    /// mountpoint without following links or crossing mounts.
    pub relative_path: Option<PathBuf>,
    /// Mount source the root must live on (e.g. `tank/data`).
    pub filesystem_source: Option<String>,
    /// Skip files born after this many seconds since the epoch.
    /// Directories are never skipped.
    pub btime_cutoff: Option<i64>,
    /// `open` flags for non-directory entries. `O_CLOEXEC` is always added.
    pub file_open_flags: i32,
    /// Invoke the reporting callback every this many yielded entries.
    /// Zero disables reporting.
    pub reporting_increment: u64,
    /// Receives `WalkProgress` every `reporting_increment` entries.
    pub reporting_callback: Option<Arc<dyn ProgressCallback<WalkProgress>>>,
    /// Position to resume from, as returned by `dir_stack()`.
    pub checkpoint: Option<Vec<DirStackEntry>>,
    /// Maximum number of open directory frames, at most [`MAX_DEPTH`].
    pub max_depth: usize,
    /// Token consulted when a blocking call is interrupted.
    pub cancel: CancelToken,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            relative_path: None,
            filesystem_source: None,
            btime_cutoff: None,
            file_open_flags: DEFAULT_FILE_OPEN_FLAGS,
            reporting_increment: 0,
            reporting_callback: None,
            checkpoint: None,
            max_depth: MAX_DEPTH,
            cancel: CancelToken::new(),
        }
    }
}

impl fmt::Debug for WalkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("relative_path", &self.relative_path)
            .field("filesystem_source", &self.filesystem_source)
            .field("btime_cutoff", &self.btime_cutoff)
            .field("file_open_flags", &self.file_open_flags)
            .field("reporting_increment", &self.reporting_increment)
            .field("reporting_callback", &self.reporting_callback.is_some())
            .field("checkpoint", &self.checkpoint)
            .field("max_depth", &self.max_depth)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl WalkOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path below the mountpoint to start from.
    ///
    /// # Arguments
    /// * `path` - Relative path; must stay beneath the mountpoint
    pub fn with_relative_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.relative_path = Some(path.into());
        self
    }

    /// Require the root to live on the given mount source.
    ///
    /// # Arguments
    /// * `source` - Expected source field of the mount
    pub fn with_filesystem_source(mut self, source: impl Into<String>) -> Self {
        self.filesystem_source = Some(source.into());
        self
    }

    /// Skip files created after `cutoff`.
    ///
    /// # Arguments
    /// * `cutoff` - Seconds since the epoch
    pub fn with_btime_cutoff(mut self, cutoff: i64) -> Self {
        self.btime_cutoff = Some(cutoff);
        self
    }

    /// Set the flags used to open non-directory entries.
    ///
    /// # Arguments
    /// * `flags` - `O_*` flags
    pub fn with_file_open_flags(mut self, flags: i32) -> Self {
        self.file_open_flags = flags;
        self
    }

    /// Report progress every `increment` yielded entries.
    ///
    /// # Arguments
    /// * `increment` - Reporting period; zero disables reporting
    /// * `callback` - Receives progress; returning `false` aborts the walk
    pub fn with_reporting<C>(mut self, increment: u64, callback: C) -> Self
    where
        C: ProgressCallback<WalkProgress> + 'static,
    {
        self.reporting_increment = increment;
        self.reporting_callback = Some(Arc::new(callback));
        self
    }

    /// Resume from a previously exported position.
    ///
    /// # Arguments
    /// * `checkpoint` - Frames returned by `dir_stack()`
    pub fn with_checkpoint(mut self, checkpoint: Vec<DirStackEntry>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Lower the depth limit. Values above [`MAX_DEPTH`] are clamped.
    ///
    /// # Arguments
    /// * `max_depth` - Maximum number of open directory frames
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Use a shared cancellation token.
    ///
    /// # Arguments
    /// * `cancel` - Token another thread may cancel
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The depth limit actually enforced.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.clamp(1, MAX_DEPTH)
    }
}
