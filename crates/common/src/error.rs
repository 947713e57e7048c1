//! Shared error types used across rusty-fsops crates.

use std::io;

use thiserror::Error;

/// Failure of a single system call made on behalf of a walk or ACL operation.
#[derive(Debug, Error)]
pub enum SysError {
    /// The call failed with an OS error other than an interruption.
    #[error("{op}({path}) failed: {source}")]
    Io {
        /// Name of the system call.
        op: &'static str,
        /// Path (or xattr name) the call operated on.
        path: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The call was interrupted and cancellation had been requested.
    #[error("{op}({path}) cancelled")]
    Cancelled {
        /// Name of the system call.
        op: &'static str,
        /// Path (or xattr name) the call operated on.
        path: String,
    },
}

impl SysError {
    /// Wrap an OS error raised by `op` on `path`.
    ///
    /// # Arguments
    /// * `op` - Name of the failing system call
    /// * `path` - Path the call operated on
    /// * `source` - The underlying IO error
    pub fn io(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// The raw errno of the underlying failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            Self::Cancelled { .. } => None,
        }
    }

    /// Whether this error is the result of a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
