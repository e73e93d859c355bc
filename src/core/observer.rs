//! Progress reporting and cooperative cancellation
//!
//! Long operations (folder traversal, bulk duplicate scans, composing several
//! destination indexes) take a [`ScanObserver`]. They call `report_progress`
//! at coarse checkpoints and poll `is_cancelled` between units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress reports and answers cancellation polls
pub trait ScanObserver {
    /// Called at coarse checkpoints: folder start, every N files, phase changes
    fn report_progress(&self, stage: &str, detail: &str);

    /// Polled between units of work
    fn is_cancelled(&self) -> bool;
}

/// Observer that ignores progress and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {
    fn report_progress(&self, _stage: &str, _detail: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation flag, cloned into whoever may request a stop
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. the one set by the Ctrl+C handler)
    pub fn from_shared(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Observer built from a cancellation flag and a progress closure
pub struct CallbackObserver<F>
where
    F: Fn(&str, &str),
{
    cancel: CancelFlag,
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(&str, &str),
{
    pub fn new(cancel: CancelFlag, callback: F) -> Self {
        Self { cancel, callback }
    }
}

impl<F> ScanObserver for CallbackObserver<F>
where
    F: Fn(&str, &str),
{
    fn report_progress(&self, stage: &str, detail: &str) {
        (self.callback)(stage, detail);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }
}
