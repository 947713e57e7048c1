//! Secure, resumable depth-first directory walker.
//!
//! Every entry is opened relative to its parent's descriptor with
//! `RESOLVE_NO_SYMLINKS | RESOLVE_NO_XDEV`, so the walk never follows a
//! symbolic link and never leaves the filesystem it started on. Entries that
//! would do either are pruned.
//!
//! The walker keeps an explicit stack of open directory streams. Its
//! position can be exported with [`DirectoryWalker::dir_stack`] and fed back
//! through [`WalkOptions::with_checkpoint`] to resume a later walk: the new
//! walker descends by inode number to the deepest recorded directory
//! without yielding anything, then continues inside it.

use std::ffi::OsString;
use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusty_fsops_common::{retry_on_interrupt, CancelToken, ProgressCallback, SysError};
use serde::{Deserialize, Serialize};

use crate::error::FileSystemError;
use crate::metadata::EntryMetadata;
use crate::mount::mount_source;
use crate::options::WalkOptions;
use crate::sys::{
    self, DirStream, RawDirEntry, RawStatx, RESOLVE_BENEATH, RESOLVE_NO_SYMLINKS, RESOLVE_NO_XDEV,
    STATX_BASIC_STATS, STATX_BTIME, STATX_MNT_ID,
};

/// Fields requested from `statx` for every entry.
const STATX_MASK: u32 = STATX_BASIC_STATS | STATX_BTIME | STATX_MNT_ID;

/// Flags used to open every directory, root included.
const DIR_OPEN_FLAGS: i32 = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW;

/// One frame of an exported walker position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirStackEntry {
    /// Directory path, for diagnostics.
    pub path: PathBuf,
    /// Inode number used to find the directory again on resume.
    pub inode: u64,
}

/// Running totals of a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Entries yielded so far.
    pub count: u64,
    /// Sum of the sizes of yielded files.
    pub bytes: u64,
    /// Directory currently being read; empty once the walk is done.
    pub current_directory: PathBuf,
}

/// Report handed to the reporting callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkProgress {
    /// Open directories, root first. Usable as a checkpoint.
    pub dir_stack: Vec<DirStackEntry>,
    pub stats: WalkStats,
}

/// A visited file or directory.
///
/// The descriptor belongs to the caller and stays valid after the walker
/// moves on or is dropped.
#[derive(Debug)]
pub struct WalkEntry {
    /// Directory containing the entry.
    pub parent: PathBuf,
    /// File name within `parent`.
    pub name: OsString,
    /// Descriptor opened without following links.
    pub fd: OwnedFd,
    pub metadata: EntryMetadata,
    pub is_dir: bool,
}

impl WalkEntry {
    /// Full path of the entry.
    pub fn path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }

    /// Take the descriptor.
    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

struct Frame {
    path: PathBuf,
    stream: DirStream,
    inode: u64,
}

/// Depth-first iterator over a directory tree.
///
/// Yields `Result<WalkEntry, FileSystemError>`. After a fatal error the
/// iterator is fused; items already yielded remain valid.
pub struct DirectoryWalker {
    stack: Vec<Frame>,
    /// Inodes still to be matched while resuming, indexed by depth.
    /// A zero entry has already been matched.
    cookies: Vec<u64>,
    restoring: bool,
    skip_pending: bool,
    last_was_dir: bool,
    finished: bool,
    count: u64,
    bytes: u64,
    file_open_flags: i32,
    btime_cutoff: Option<i64>,
    reporting_increment: u64,
    reporting_callback: Option<Arc<dyn ProgressCallback<WalkProgress>>>,
    max_depth: usize,
    cancel: CancelToken,
}

impl DirectoryWalker {
    /// Open a walk rooted at `mountpoint`, or below it when
    /// `options.relative_path` is set.
    ///
    /// # Arguments
    /// * `mountpoint` - Mountpoint of the filesystem to walk
    /// * `options` - Walk configuration
    ///
    /// # Errors
    /// Returns an error if the root cannot be opened without following
    /// links, is not a directory, lives on an unexpected filesystem, does
    /// not match the checkpoint's root inode, or the checkpoint is malformed.
    pub fn new(mountpoint: impl AsRef<Path>, options: WalkOptions) -> Result<Self, FileSystemError> {
        let mountpoint: &Path = mountpoint.as_ref();
        let cancel: CancelToken = options.cancel.clone();

        let mount_fd: OwnedFd = open_root(&cancel, None, mountpoint, mountpoint, RESOLVE_NO_SYMLINKS)?;
        let (root_path, root_fd): (PathBuf, OwnedFd) = match &options.relative_path {
            Some(relative) => {
                let root_path: PathBuf = mountpoint.join(relative);
                let fd: OwnedFd = open_root(
                    &cancel,
                    Some(&mount_fd),
                    relative,
                    &root_path,
                    RESOLVE_NO_SYMLINKS | RESOLVE_NO_XDEV | RESOLVE_BENEATH,
                )?;
                (root_path, fd)
            }
            None => (mountpoint.to_path_buf(), mount_fd),
        };
        let root_display: String = root_path.display().to_string();

        let stx: RawStatx = retry_on_interrupt(&cancel, "statx", &root_display, || {
            sys::statx(root_fd.as_fd(), STATX_MASK)
        })?;
        let root_meta: EntryMetadata = EntryMetadata::from(&stx);
        if !root_meta.is_dir() {
            return Err(FileSystemError::NotADirectory { path: root_display });
        }

        if let Some(expected) = &options.filesystem_source {
            check_source(&root_display, &root_meta, expected)?;
        }

        let mut cookies: Vec<u64> = options
            .checkpoint
            .as_ref()
            .map(|frames| frames.iter().map(|f| f.inode).collect())
            .unwrap_or_default();
        if cookies.len() <= 1 {
            cookies.clear();
        } else {
            if cookies[0] != 0 && cookies[0] != root_meta.ino {
                log::warn!(
                    "checkpoint root inode {} does not match {} (inode {})",
                    cookies[0],
                    root_display,
                    root_meta.ino
                );
                return Err(FileSystemError::RestoreFailed {
                    depth: 0,
                    path: root_display,
                });
            }
            if let Some(depth) = cookies.iter().skip(1).position(|&ino| ino == 0) {
                return Err(FileSystemError::InvalidCheckpoint { depth: depth + 1 });
            }
            let max_depth: usize = options.effective_max_depth();
            if cookies.len() > max_depth {
                return Err(FileSystemError::InvalidCheckpoint { depth: max_depth });
            }
            cookies[0] = 0;
            log::debug!("resuming walk of {} at depth {}", root_display, cookies.len() - 1);
        }

        let stream: DirStream = DirStream::from_fd(root_fd)
            .map_err(|e| SysError::io("fdopendir", root_display.clone(), e))?;

        Ok(Self {
            stack: vec![Frame {
                path: root_path,
                stream,
                inode: root_meta.ino,
            }],
            restoring: !cookies.is_empty(),
            cookies,
            skip_pending: false,
            last_was_dir: false,
            finished: false,
            count: 0,
            bytes: 0,
            file_open_flags: options.file_open_flags,
            btime_cutoff: options.btime_cutoff,
            reporting_increment: options.reporting_increment,
            reporting_callback: options.reporting_callback.clone(),
            max_depth: options.effective_max_depth(),
            cancel,
        })
    }

    /// Do not descend into the directory just yielded.
    ///
    /// # Errors
    /// Returns [`FileSystemError::SkipNotDirectory`] unless the last yielded
    /// item was a directory. The walk is unaffected by the error.
    pub fn skip(&mut self) -> Result<(), FileSystemError> {
        if !self.last_was_dir {
            return Err(FileSystemError::SkipNotDirectory);
        }
        self.last_was_dir = false;
        self.skip_pending = true;
        Ok(())
    }

    /// Current position as an ordered list of open directories, root first.
    pub fn dir_stack(&self) -> Vec<DirStackEntry> {
        self.stack
            .iter()
            .map(|frame| DirStackEntry {
                path: frame.path.clone(),
                inode: frame.inode,
            })
            .collect()
    }

    pub fn get_stats(&self) -> WalkStats {
        WalkStats {
            count: self.count,
            bytes: self.bytes,
            current_directory: self.stack.last().map(|f| f.path.clone()).unwrap_or_default(),
        }
    }

    /// Whether checkpoint frames remain to be matched.
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.stack.pop() {
            log::debug!("leaving {}", frame.path.display());
        }
    }

    fn push_frame(&mut self, path: PathBuf, fd: &OwnedFd, inode: u64) -> Result<(), FileSystemError> {
        let display: String = path.display().to_string();
        if self.stack.len() >= self.max_depth {
            return Err(FileSystemError::DepthExceeded {
                max_depth: self.max_depth,
                path: display,
            });
        }
        let dup: OwnedFd = retry_on_interrupt(&self.cancel, "dup", &display, || fd.try_clone())?;
        let stream: DirStream =
            DirStream::from_fd(dup).map_err(|e| SysError::io("fdopendir", display.clone(), e))?;
        log::debug!("entering {} (depth {})", display, self.stack.len());
        self.stack.push(Frame { path, stream, inode });
        Ok(())
    }

    fn restore_failed(&self, depth: usize) -> FileSystemError {
        let path: String = self
            .stack
            .last()
            .map(|f| f.path.display().to_string())
            .unwrap_or_default();
        FileSystemError::RestoreFailed { depth, path }
    }

    fn report(&self, current_directory: &Path) -> Result<(), FileSystemError> {
        let Some(callback) = &self.reporting_callback else {
            return Ok(());
        };
        if self.reporting_increment == 0 || self.count % self.reporting_increment != 0 {
            return Ok(());
        }
        let progress: WalkProgress = WalkProgress {
            dir_stack: self.dir_stack(),
            stats: WalkStats {
                count: self.count,
                bytes: self.bytes,
                current_directory: current_directory.to_path_buf(),
            },
        };
        if !callback.on_progress(&progress) {
            return Err(FileSystemError::ReportingAborted { count: self.count });
        }
        Ok(())
    }

    /// Advance to the next entry to yield.
    fn step(&mut self) -> Result<Option<WalkEntry>, FileSystemError> {
        if self.skip_pending {
            self.skip_pending = false;
            self.pop_frame();
        }
        self.last_was_dir = false;

        loop {
            // Children of the top frame sit at this checkpoint depth.
            let depth: usize = self.stack.len();
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            let parent_display: String = top.path.display().to_string();

            let entry: Option<RawDirEntry> =
                retry_on_interrupt(&self.cancel, "readdir", &parent_display, || top.stream.read())?;
            let Some(entry) = entry else {
                if self.restoring && self.cookies.get(depth).is_some_and(|&c| c != 0) {
                    return Err(self.restore_failed(depth));
                }
                self.pop_frame();
                continue;
            };
            if entry.is_dot() {
                continue;
            }

            let mut resuming_into: bool = false;
            if self.restoring {
                if let Some(&cookie) = self.cookies.get(depth) {
                    if cookie != 0 {
                        if entry.ino != cookie {
                            log::trace!("restore: skipping {:?} in {}", entry.name, parent_display);
                            continue;
                        }
                        self.cookies[depth] = 0;
                        resuming_into = true;
                    }
                }
            }

            let parent: PathBuf = top.path.clone();
            let path: PathBuf = parent.join(entry.name_os());
            let path_display: String = path.display().to_string();
            let flags: i32 = if entry.d_type == libc::DT_DIR {
                DIR_OPEN_FLAGS
            } else {
                self.file_open_flags
            };

            let opened = retry_on_interrupt(&self.cancel, "openat2", &path_display, || {
                sys::openat2(
                    Some(top.stream.fd()),
                    &entry.name,
                    flags,
                    RESOLVE_NO_XDEV | RESOLVE_NO_SYMLINKS,
                )
            });
            let fd: OwnedFd = match opened {
                Ok(fd) => fd,
                Err(err) if is_boundary(&err) => {
                    log::warn!("pruning {}: {}", path_display, err);
                    if resuming_into {
                        return Err(self.restore_failed(depth));
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let stx: RawStatx = retry_on_interrupt(&self.cancel, "statx", &path_display, || {
                sys::statx(fd.as_fd(), STATX_MASK)
            })?;
            let metadata: EntryMetadata = EntryMetadata::from(&stx);
            let is_dir: bool = metadata.is_dir();

            if resuming_into && !is_dir {
                return Err(self.restore_failed(depth));
            }

            if !is_dir {
                if let (Some(cutoff), Some(btime)) = (self.btime_cutoff, metadata.btime) {
                    if btime.sec > cutoff {
                        log::trace!("skipping {}: born after cutoff", path_display);
                        continue;
                    }
                }
                self.count += 1;
                self.bytes += metadata.size;
            } else {
                self.push_frame(path, &fd, metadata.ino)?;
                if self.restoring {
                    if self.stack.len() >= self.cookies.len() {
                        log::debug!("checkpoint consumed at {}", path_display);
                        self.restoring = false;
                        self.cookies.clear();
                    }
                    continue;
                }
                self.count += 1;
                self.last_was_dir = true;
            }

            self.report(&parent)?;
            return Ok(Some(WalkEntry {
                parent,
                name: entry.name_os().to_os_string(),
                fd,
                metadata,
                is_dir,
            }));
        }
    }
}

impl Iterator for DirectoryWalker {
    type Item = Result<WalkEntry, FileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                if err.is_fatal() {
                    log::debug!("walk stopped: {}", err);
                    self.finished = true;
                }
                Some(Err(err))
            }
        }
    }
}

/// Errors that prune a single entry instead of failing the walk.
fn is_boundary(err: &SysError) -> bool {
    matches!(err.raw_os_error(), Some(libc::ELOOP) | Some(libc::EXDEV))
}

fn open_root(
    cancel: &CancelToken,
    dirfd: Option<&OwnedFd>,
    path: &Path,
    display: &Path,
    resolve: u64,
) -> Result<OwnedFd, FileSystemError> {
    let display: String = display.display().to_string();
    let cpath = sys::path_to_cstring(path.as_os_str())
        .map_err(|e| FileSystemError::from(SysError::io("openat2", display.clone(), e)))?;
    let opened = retry_on_interrupt(cancel, "openat2", &display, || {
        sys::openat2(dirfd.map(|fd| fd.as_fd()), &cpath, DIR_OPEN_FLAGS, resolve)
    });
    match opened {
        Ok(fd) => Ok(fd),
        Err(err) if err.raw_os_error() == Some(libc::ENOTDIR) => {
            Err(FileSystemError::NotADirectory { path: display })
        }
        Err(err) => Err(err.into()),
    }
}

fn check_source(root: &str, meta: &EntryMetadata, expected: &str) -> Result<(), FileSystemError> {
    let mnt_id: u64 = meta.mnt_id.unwrap_or(0);
    let source: Option<String> =
        mount_source(mnt_id).map_err(|e| SysError::io("read", crate::mount::MOUNTINFO_PATH, e))?;
    match source {
        None => Err(FileSystemError::MountNotFound {
            path: root.to_string(),
            mnt_id,
        }),
        Some(actual) if actual != expected => Err(FileSystemError::SourceMismatch {
            path: root.to_string(),
            expected: expected.to_string(),
            actual,
        }),
        Some(_) => Ok(()),
    }
}
