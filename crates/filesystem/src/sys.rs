//! Thin wrappers over the Linux calls the walker is built on: `openat2`,
//! `statx` and directory streams.
//!
//! Nothing here retries or logs; callers wrap each call in
//! `retry_on_interrupt`.

use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::ptr::NonNull;

/// Fail if resolution would cross a mount point.
pub const RESOLVE_NO_XDEV: u64 = 0x01;
/// Fail if resolution meets any symbolic link.
pub const RESOLVE_NO_SYMLINKS: u64 = 0x04;
/// Fail if resolution would escape the starting directory.
pub const RESOLVE_BENEATH: u64 = 0x08;

pub const STATX_BASIC_STATS: u32 = 0x0000_07ff;
pub const STATX_BTIME: u32 = 0x0000_0800;
pub const STATX_MNT_ID: u32 = 0x0000_1000;

/// `struct statx` as filled in by the kernel.
pub type RawStatx = libc::statx;
/// `struct statx_timestamp`.
pub type RawStatxTimestamp = libc::statx_timestamp;

/// An all-zero `statx` buffer.
pub fn empty_statx() -> RawStatx {
    // SAFETY: every field is an integer; all-zero is a valid value.
    unsafe { mem::zeroed() }
}

/// Convert a path to a C string.
pub fn path_to_cstring(path: &OsStr) -> io::Result<CString> {
    CString::new(path.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Open `path` relative to `dirfd` (or the working directory) with
/// resolution restrictions.
///
/// `O_CLOEXEC` is always added to `flags`.
pub fn openat2(
    dirfd: Option<BorrowedFd<'_>>,
    path: &CStr,
    flags: i32,
    resolve: u64,
) -> io::Result<OwnedFd> {
    // SAFETY: open_how is plain integers; zero means no mode and no resolve flags.
    let mut how: libc::open_how = unsafe { mem::zeroed() };
    how.flags = (flags | libc::O_CLOEXEC) as u64;
    how.resolve = resolve;
    let dirfd: RawFd = dirfd.map_or(libc::AT_FDCWD, |fd| fd.as_raw_fd());
    // SAFETY: path is NUL-terminated and how lives for the duration of the call.
    let ret: libc::c_long = unsafe {
        libc::syscall(
            libc::SYS_openat2,
            dirfd,
            path.as_ptr(),
            &how as *const libc::open_how,
            mem::size_of::<libc::open_how>(),
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the kernel returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
}

/// `statx` on an open descriptor, never following links.
pub fn statx(fd: BorrowedFd<'_>, mask: u32) -> io::Result<RawStatx> {
    let mut buf: RawStatx = empty_statx();
    let empty: &CStr = c_str_empty();
    // SAFETY: buf is a valid statx buffer and empty is NUL-terminated.
    let ret: libc::c_long = unsafe {
        libc::syscall(
            libc::SYS_statx,
            fd.as_raw_fd(),
            empty.as_ptr(),
            libc::AT_EMPTY_PATH | libc::AT_SYMLINK_NOFOLLOW,
            mask,
            &mut buf as *mut RawStatx,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(buf)
}

fn c_str_empty() -> &'static CStr {
    // SAFETY: a single NUL byte is a valid empty C string.
    unsafe { CStr::from_bytes_with_nul_unchecked(b"\0") }
}

/// One record returned by `readdir`.
#[derive(Debug, Clone)]
pub struct RawDirEntry {
    pub name: CString,
    pub ino: u64,
    pub d_type: u8,
}

impl RawDirEntry {
    /// `.` or `..`.
    pub fn is_dot(&self) -> bool {
        matches!(self.name.to_bytes(), b"." | b"..")
    }

    pub fn name_os(&self) -> &OsStr {
        OsStr::from_bytes(self.name.to_bytes())
    }
}

/// Owned directory stream. Closed exactly once on drop.
#[derive(Debug)]
pub struct DirStream {
    dirp: NonNull<libc::DIR>,
}

// The stream is only ever used through `&mut self` by its single owner.
unsafe impl Send for DirStream {}

impl DirStream {
    /// Take ownership of a directory descriptor and open a stream on it.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        let raw: RawFd = fd.into_raw_fd();
        // SAFETY: raw is an open descriptor; on success the stream owns it.
        let dirp: *mut libc::DIR = unsafe { libc::fdopendir(raw) };
        match NonNull::new(dirp) {
            Some(dirp) => Ok(Self { dirp }),
            None => {
                let err: io::Error = io::Error::last_os_error();
                // SAFETY: fdopendir failed, so raw is still ours to close.
                drop(unsafe { OwnedFd::from_raw_fd(raw) });
                Err(err)
            }
        }
    }

    /// Next entry, or `None` at end of stream.
    pub fn read(&mut self) -> io::Result<Option<RawDirEntry>> {
        // readdir signals errors only through errno.
        // SAFETY: errno is thread-local.
        unsafe { *libc::__errno_location() = 0 };
        // SAFETY: dirp is a live stream owned by self.
        let ent: *mut libc::dirent = unsafe { libc::readdir(self.dirp.as_ptr()) };
        if ent.is_null() {
            let err: io::Error = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(0) | None => Ok(None),
                Some(_) => Err(err),
            };
        }
        // SAFETY: readdir returned a valid entry that stays alive until the
        // next call on this stream; the name is copied out before then.
        let ent: &libc::dirent = unsafe { &*ent };
        let name: CString = unsafe { CStr::from_ptr(ent.d_name.as_ptr()) }.to_owned();
        Ok(Some(RawDirEntry {
            name,
            ino: ent.d_ino as u64,
            d_type: ent.d_type,
        }))
    }

    /// Descriptor backing the stream.
    pub fn fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor stays open for as long as the stream does.
        unsafe { BorrowedFd::borrow_raw(libc::dirfd(self.dirp.as_ptr())) }
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        // SAFETY: dirp is live and never used after this.
        unsafe {
            libc::closedir(self.dirp.as_ptr());
        }
    }
}
