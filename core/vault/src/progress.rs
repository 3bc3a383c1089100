//! Step-labelled progress events.
//!
//! Mutating operations announce each step before running it and report
//! completion afterwards. Rendering is left to the caller.

/// Receives progress events from vault operations.
pub trait Progress: Send + Sync {
    /// Step `step` of `total` is starting.
    fn step(&self, step: usize, total: usize, label: &str);

    /// The current step finished.
    fn done(&self, label: &str);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn step(&self, _step: usize, _total: usize, _label: &str) {}

    fn done(&self, _label: &str) {}
}

pub(crate) static NO_PROGRESS: NoProgress = NoProgress;
