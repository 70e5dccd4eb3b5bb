//! Progress phases and ETA.
//!
//! A running task starts at [`PROGRESS_FLOOR`]. Extraction attempts move it
//! through `[0.1, 0.5)` and fetched items through `[0.5, 1.0]`.

use std::time::Duration;

use tokio::sync::mpsc;

pub use super::constants::{FETCH_PHASE_START, PROGRESS_FLOOR};

/// Progress shown before extraction attempt `attempt` (0-indexed) of `total`.
#[must_use]
pub(crate) fn extraction_progress(attempt: u32, total: u32) -> f64 {
    if total == 0 {
        return PROGRESS_FLOOR;
    }
    let span = FETCH_PHASE_START - PROGRESS_FLOOR;
    PROGRESS_FLOOR + span * f64::from(attempt.min(total)) / f64::from(total)
}

/// Progress after `done` of `total` items were fetched.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn fetch_progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        return FETCH_PHASE_START;
    }
    let span = 1.0 - FETCH_PHASE_START;
    FETCH_PHASE_START + span * (done.min(total) as f64) / (total as f64)
}

/// Estimates the remaining time of a task from its elapsed time and progress.
///
/// Returns `None` until progress moves past [`PROGRESS_FLOOR`]. The estimate
/// extrapolates linearly over the `0.9` of progress left after the floor and
/// never goes negative.
#[must_use]
pub fn estimate_remaining(elapsed: Duration, progress: f64) -> Option<Duration> {
    if !progress.is_finite() || progress <= PROGRESS_FLOOR {
        return None;
    }
    let elapsed_secs = elapsed.as_secs_f64();
    let total = elapsed_secs / (progress - PROGRESS_FLOOR) * (1.0 - PROGRESS_FLOOR);
    let remaining = (total - elapsed_secs).max(0.0);
    Duration::try_from_secs_f64(remaining).ok()
}

/// Sends progress values to the manager's forwarder.
#[derive(Debug, Clone)]
pub(crate) struct ProgressReporter {
    tx: mpsc::UnboundedSender<f64>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<f64>) -> Self {
        Self { tx }
    }

    pub(crate) fn report(&self, progress: f64) {
        // Forwarder gone means the run was already torn down
        let _ = self.tx.send(progress.clamp(0.0, 1.0));
    }
}
