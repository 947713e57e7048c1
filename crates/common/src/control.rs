//! Flow control for long-running operations: progress callbacks and
//! cooperative cancellation.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives periodic progress reports from a long-running operation.
///
/// `T` is the report type, so the walker and other producers can share the
/// callback plumbing while reporting different data.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called with a progress report.
    ///
    /// # Arguments
    /// * `progress` - Snapshot of the operation's current state
    ///
    /// # Returns
    /// - `true` to keep going
    /// - `false` to abort the operation
    fn on_progress(&self, progress: &T) -> bool;
}

/// Callback that ignores every report.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) -> bool {
        true
    }
}

/// Closure-backed progress callback.
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<fn(&T)>,
}

impl<F, T> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    /// Wrap a closure.
    ///
    /// # Arguments
    /// * `callback` - Closure returning whether to continue
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _marker: PhantomData,
        }
    }
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn on_progress(&self, progress: &T) -> bool {
        (self.callback)(progress)
    }
}

/// Build a progress callback from a closure.
///
/// # Arguments
/// * `f` - Closure returning whether to continue
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    FnProgress::new(f)
}

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a token handed to a walker can be
/// cancelled from another thread. Cancellation is only observed when a
/// blocking call is interrupted (`EINTR`), mirroring how a pending signal
/// aborts a syscall.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
