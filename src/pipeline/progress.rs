//! Build progress reporting and the asynchronous build handle

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;

use crate::core::error::Error;
use crate::core::types::Result;
use super::NavigationData;

/// Stage a navigation build is in
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    Pending = 0,
    Voxelizing = 1,
    Classifying = 2,
    Linking = 3,
    Done = 4,
    Failed = 5,
    Cancelled = 6,
}

impl BuildPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Voxelizing,
            2 => Self::Classifying,
            3 => Self::Linking,
            4 => Self::Done,
            5 => Self::Failed,
            6 => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Slice of the overall progress bar this phase covers
    fn span(self) -> (f32, f32) {
        match self {
            Self::Pending => (0.0, 0.0),
            Self::Voxelizing => (0.0, 0.5),
            Self::Classifying => (0.5, 0.9),
            Self::Linking => (0.9, 1.0),
            Self::Done | Self::Failed | Self::Cancelled => (1.0, 1.0),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Lock-free progress shared between a running build and its observers.
#[derive(Debug)]
pub struct BuildProgress {
    phase: AtomicU8,
    completed: AtomicUsize,
    total: AtomicUsize,
    cancelled: AtomicBool,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildProgress {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(BuildPhase::Pending as u8),
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Enter `phase` expecting `total` units of work
    pub fn begin(&self, phase: BuildPhase, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// One unit of the current phase finished
    pub fn tick(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn phase(&self) -> BuildPhase {
        BuildPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Overall completion in `[0, 1]`; 1 once the build has stopped.
    pub fn fraction(&self) -> f32 {
        let (lo, hi) = self.phase().span();
        let total = self.total.load(Ordering::Relaxed);
        let done = self.completed.load(Ordering::Relaxed);
        let within = if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32).min(1.0)
        };
        lo + (hi - lo) * within
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancelled
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle to a build running on its own thread.
///
/// The result is delivered once through a oneshot channel: await it with
/// [`BuildHandle::finish`] or block on it with [`BuildHandle::wait`].
/// Dropping the handle does not stop the build; call [`BuildHandle::cancel`].
pub struct BuildHandle {
    progress: Arc<BuildProgress>,
    result: oneshot::Receiver<Result<NavigationData>>,
    thread: JoinHandle<()>,
}

impl BuildHandle {
    pub(crate) fn new(
        progress: Arc<BuildProgress>,
        result: oneshot::Receiver<Result<NavigationData>>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self { progress, result, thread }
    }

    pub fn progress(&self) -> f32 {
        self.progress.fraction()
    }

    pub fn phase(&self) -> BuildPhase {
        self.progress.phase()
    }

    /// Ask the build to stop. In-flight batch results are discarded and the
    /// result becomes [`Error::Cancelled`] unless the build already finished.
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the result without blocking the async runtime
    pub async fn finish(self) -> Result<NavigationData> {
        self.result.await.map_err(|_| Error::WorkerLost)?
    }

    /// Block the current thread until the result is ready.
    /// Must not be called from inside an async context.
    pub fn wait(self) -> Result<NavigationData> {
        self.result.blocking_recv().map_err(|_| Error::WorkerLost)?
    }
}
