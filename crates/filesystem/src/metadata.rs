//! Metadata reported for each walked entry.

use serde::{Deserialize, Serialize};

use crate::sys::{RawStatx, RawStatxTimestamp, STATX_BTIME, STATX_MNT_ID};

/// Seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl From<RawStatxTimestamp> for Timestamp {
    fn from(ts: RawStatxTimestamp) -> Self {
        Self {
            sec: ts.tv_sec,
            nsec: ts.tv_nsec,
        }
    }
}

/// Kind of filesystem object, from the mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

/// Extended stat of an entry, as returned by `statx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Which fields the filesystem actually filled in.
    pub mask: u32,
    /// File type and permission bits.
    pub mode: u32,
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    /// Birth time; `None` when the filesystem does not record it.
    pub btime: Option<Timestamp>,
    /// Mount id; `None` on kernels that do not report it.
    pub mnt_id: Option<u64>,
    pub dev_major: u32,
    pub dev_minor: u32,
}

impl EntryMetadata {
    pub fn kind(&self) -> FileKind {
        match self.mode & libc::S_IFMT {
            libc::S_IFREG => FileKind::File,
            libc::S_IFDIR => FileKind::Directory,
            libc::S_IFLNK => FileKind::Symlink,
            libc::S_IFBLK => FileKind::BlockDevice,
            libc::S_IFCHR => FileKind::CharDevice,
            libc::S_IFIFO => FileKind::Fifo,
            libc::S_IFSOCK => FileKind::Socket,
            _ => FileKind::Unknown,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

impl From<&RawStatx> for EntryMetadata {
    fn from(stx: &RawStatx) -> Self {
        Self {
            mask: stx.stx_mask,
            mode: u32::from(stx.stx_mode),
            ino: stx.stx_ino,
            size: stx.stx_size,
            blocks: stx.stx_blocks,
            nlink: stx.stx_nlink,
            uid: stx.stx_uid,
            gid: stx.stx_gid,
            atime: stx.stx_atime.into(),
            mtime: stx.stx_mtime.into(),
            ctime: stx.stx_ctime.into(),
            btime: (stx.stx_mask & STATX_BTIME != 0).then(|| stx.stx_btime.into()),
            mnt_id: (stx.stx_mask & STATX_MNT_ID != 0).then_some(stx.stx_mnt_id),
            dev_major: stx.stx_dev_major,
            dev_minor: stx.stx_dev_minor,
        }
    }
}
