//! Shared types and utilities for rusty-fsops.
//!
//! This crate provides functionality used by the walker and ACL crates:
//! - Shared constants (depth limit, ACL xattr names)
//! - `SysError` for failed system calls
//! - Generic progress callback trait and `CancelToken`
//! - `retry_on_interrupt` for `EINTR`-prone calls

pub mod constants;
pub mod control;
pub mod error;
pub mod retry;

// Re-export commonly used items at crate root
pub use constants::*;
pub use control::{progress_fn, CancelToken, FnProgress, NoOpProgress, ProgressCallback};
pub use error::SysError;
pub use retry::retry_on_interrupt;
