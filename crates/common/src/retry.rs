//! Retry-on-interrupt wrapper for blocking system calls.

use std::io;

use crate::control::CancelToken;
use crate::error::SysError;

/// Run `call` until it completes without `EINTR`.
///
/// An interrupted call is retried unless `cancel` has been triggered, in
/// which case the operation aborts with [`SysError::Cancelled`].
///
/// # Arguments
/// * `cancel` - Cancellation token checked after each interruption
/// * `op` - Name of the system call, for error reporting
/// * `path` - Path the call operates on, for error reporting
/// * `call` - The system call wrapper
///
/// # Errors
/// Returns [`SysError::Io`] for any OS error other than `EINTR`.
pub fn retry_on_interrupt<T, F>(
    cancel: &CancelToken,
    op: &'static str,
    path: &str,
    mut call: F,
) -> Result<T, SysError>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                if cancel.is_cancelled() {
                    return Err(SysError::Cancelled {
                        op,
                        path: path.to_string(),
                    });
                }
                log::trace!("{}({}) interrupted, retrying", op, path);
            }
            Err(err) => return Err(SysError::io(op, path, err)),
        }
    }
}
