//! Reading and writing ACLs through extended attributes on an open handle.
//!
//! NFS4 support is probed first; a filesystem that rejects the NFS4 xattr
//! with `EOPNOTSUPP` is treated as POSIX.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use rusty_fsops_common::{
    retry_on_interrupt, CancelToken, SysError, NFS4_ACL_XATTR, POSIX_ACL_ACCESS_XATTR,
    POSIX_ACL_DEFAULT_XATTR,
};

use crate::error::AclError;
use crate::nfs4::Nfs4Acl;
use crate::posix::PosixAcl;
use crate::Acl;

fn xattr_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn fgetxattr_vec(fd: BorrowedFd<'_>, name: &str) -> io::Result<Vec<u8>> {
    let cname: CString = xattr_name(name)?;
    loop {
        // SAFETY: a null buffer with size 0 only queries the value length.
        let size: isize =
            unsafe { libc::fgetxattr(fd.as_raw_fd(), cname.as_ptr(), std::ptr::null_mut(), 0) };
        if size < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut buf: Vec<u8> = vec![0u8; size as usize];
        // SAFETY: buf is valid for buf.len() bytes.
        let read: isize = unsafe {
            libc::fgetxattr(
                fd.as_raw_fd(),
                cname.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        if read >= 0 {
            buf.truncate(read as usize);
            return Ok(buf);
        }
        let err: io::Error = io::Error::last_os_error();
        // Value grew between the two calls.
        if err.raw_os_error() != Some(libc::ERANGE) {
            return Err(err);
        }
    }
}

fn fsetxattr_bytes(fd: BorrowedFd<'_>, name: &str, value: &[u8]) -> io::Result<()> {
    let cname: CString = xattr_name(name)?;
    // SAFETY: value is valid for value.len() bytes.
    let rc: libc::c_int = unsafe {
        libc::fsetxattr(
            fd.as_raw_fd(),
            cname.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn fremovexattr_name(fd: BorrowedFd<'_>, name: &str) -> io::Result<()> {
    let cname: CString = xattr_name(name)?;
    // SAFETY: cname is a valid NUL-terminated string.
    let rc: libc::c_int = unsafe { libc::fremovexattr(fd.as_raw_fd(), cname.as_ptr()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn fstat_is_dir(fd: BorrowedFd<'_>) -> io::Result<bool> {
    // SAFETY: libc::stat is plain old data; fstat fills it in.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc: libc::c_int = unsafe { libc::fstat(fd.as_raw_fd(), &mut st) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.st_mode & libc::S_IFMT == libc::S_IFDIR)
}

/// Read an xattr; `ENODATA` maps to `None`.
fn read_xattr(
    fd: BorrowedFd<'_>,
    name: &'static str,
    cancel: &CancelToken,
) -> Result<Option<Vec<u8>>, SysError> {
    match retry_on_interrupt(cancel, "fgetxattr", name, || fgetxattr_vec(fd, name)) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.raw_os_error() == Some(libc::ENODATA) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Remove an xattr; a missing xattr is not an error.
fn remove_xattr(fd: BorrowedFd<'_>, name: &'static str, cancel: &CancelToken) -> Result<(), SysError> {
    match retry_on_interrupt(cancel, "fremovexattr", name, || fremovexattr_name(fd, name)) {
        Err(err) if err.raw_os_error() == Some(libc::ENODATA) => Ok(()),
        other => other,
    }
}

fn is_unsupported(err: &SysError) -> bool {
    err.raw_os_error() == Some(libc::EOPNOTSUPP)
}

/// Probe for NFS4 ACL support. `Ok(None)` means the filesystem is POSIX.
fn probe_nfs4(fd: BorrowedFd<'_>, cancel: &CancelToken) -> Result<Option<Nfs4Acl>, AclError> {
    match read_xattr(fd, NFS4_ACL_XATTR, cancel) {
        Ok(data) => Ok(Some(Nfs4Acl::from_bytes(data.unwrap_or_default()))),
        Err(err) if is_unsupported(&err) => {
            log::trace!("{} not supported, falling back to POSIX ACLs", NFS4_ACL_XATTR);
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Read the ACL of an open file or directory.
///
/// # Arguments
/// * `fd` - Handle to the object
/// * `cancel` - Cancellation token consulted on `EINTR`
///
/// # Returns
/// `Acl::Nfs4` on NFS4-capable filesystems (empty if no ACL is set),
/// otherwise `Acl::Posix` with an empty access blob when no extended ACL
/// exists.
///
/// # Errors
/// Returns [`AclError::AclsDisabled`] if the filesystem supports neither
/// flavor, or the xattr failure.
pub fn get_acl(fd: impl AsFd, cancel: &CancelToken) -> Result<Acl, AclError> {
    let fd: BorrowedFd<'_> = fd.as_fd();
    if let Some(acl) = probe_nfs4(fd, cancel)? {
        return Ok(Acl::Nfs4(acl));
    }

    let access: Vec<u8> = match read_xattr(fd, POSIX_ACL_ACCESS_XATTR, cancel) {
        Ok(data) => data.unwrap_or_default(),
        Err(err) if is_unsupported(&err) => return Err(AclError::AclsDisabled),
        Err(err) => return Err(err.into()),
    };
    let default: Option<Vec<u8>> = match read_xattr(fd, POSIX_ACL_DEFAULT_XATTR, cancel) {
        Ok(data) => data,
        Err(err) if is_unsupported(&err) => return Err(AclError::AclsDisabled),
        Err(err) => return Err(err.into()),
    };
    Ok(Acl::Posix(PosixAcl::from_bytes(access, default)))
}

/// Validate and write an ACL to an open file or directory.
///
/// For a directory given a POSIX ACL without a default ACL, any existing
/// default ACL is removed.
///
/// # Errors
/// Returns the validation error, or the xattr failure.
pub fn set_acl(fd: impl AsFd, acl: &Acl, cancel: &CancelToken) -> Result<(), AclError> {
    let fd: BorrowedFd<'_> = fd.as_fd();
    let is_dir: bool = retry_on_interrupt(cancel, "fstat", "<fd>", || fstat_is_dir(fd))?;
    if let Err(err) = acl.validate(is_dir) {
        log::warn!("refusing to set invalid {:?} ACL: {}", acl.acl_type(), err);
        return Err(err);
    }

    match acl {
        Acl::Nfs4(nfs4) => {
            retry_on_interrupt(cancel, "fsetxattr", NFS4_ACL_XATTR, || {
                fsetxattr_bytes(fd, NFS4_ACL_XATTR, nfs4.as_bytes())
            })?;
        }
        Acl::Posix(posix) => {
            retry_on_interrupt(cancel, "fsetxattr", POSIX_ACL_ACCESS_XATTR, || {
                fsetxattr_bytes(fd, POSIX_ACL_ACCESS_XATTR, posix.access_bytes())
            })?;
            match posix.default_bytes() {
                Some(default) => {
                    retry_on_interrupt(cancel, "fsetxattr", POSIX_ACL_DEFAULT_XATTR, || {
                        fsetxattr_bytes(fd, POSIX_ACL_DEFAULT_XATTR, default)
                    })?;
                }
                None if is_dir => remove_xattr(fd, POSIX_ACL_DEFAULT_XATTR, cancel)?,
                None => {}
            }
        }
    }
    Ok(())
}

/// Remove every extended ACL from an open file or directory.
///
/// # Errors
/// Returns the xattr failure; missing ACLs are not an error.
pub fn remove_acl(fd: impl AsFd, cancel: &CancelToken) -> Result<(), AclError> {
    let fd: BorrowedFd<'_> = fd.as_fd();
    if probe_nfs4(fd, cancel)?.is_some() {
        remove_xattr(fd, NFS4_ACL_XATTR, cancel)?;
        return Ok(());
    }
    remove_xattr(fd, POSIX_ACL_ACCESS_XATTR, cancel)?;
    if retry_on_interrupt(cancel, "fstat", "<fd>", || fstat_is_dir(fd))? {
        remove_xattr(fd, POSIX_ACL_DEFAULT_XATTR, cancel)?;
    }
    Ok(())
}
