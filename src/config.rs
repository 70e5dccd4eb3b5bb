//! Tuning knobs for the download queue.
//!
//! [`QueueConfig`] gathers the thresholds and delays the scheduler and the
//! per-chapter pipeline use. The defaults match the behavior readers expect
//! from the mobile client; tests shrink the delays to milliseconds.

use std::time::Duration;

use thiserror::Error;

/// Minimum number of page images a chapter must yield to count as downloaded.
pub const DEFAULT_MIN_ITEMS: usize = 9;

/// Default number of extraction attempts.
pub const DEFAULT_WAIT_ATTEMPTS: u32 = 5;

/// Default wait unit; attempt `n` waits `n` units before checking.
const DEFAULT_WAIT_UNIT: Duration = Duration::from_secs(1);

/// Attempts up to and including this one never exit early.
const DEFAULT_EARLY_EXIT_AFTER_ATTEMPT: u32 = 3;

/// Grace period between tearing down one extraction session and starting the next.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pause between a finished task and the next scheduler run.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Per-item fetch timeout.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress shown for a task that was interrupted by `pause()`.
const DEFAULT_PAUSED_PROGRESS: f64 = 0.05;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value is outside its accepted range.
    #[error("invalid value for `{field}`: {reason}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// What the accepted range is.
        reason: &'static str,
    },
}

/// Scheduler and pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Minimum page count for a chapter to succeed.
    pub min_items: usize,
    /// Number of extraction attempts before giving up.
    pub wait_attempts: u32,
    /// Base unit of the linear extraction wait.
    pub wait_unit: Duration,
    /// Early exit on a sufficient result is only allowed after this attempt.
    pub early_exit_after_attempt: u32,
    /// Delay between session teardown and the next pipeline start.
    pub settle_delay: Duration,
    /// Delay after a finished task before the scheduler runs again.
    pub cooldown: Duration,
    /// Timeout for a single content fetch.
    pub fetch_timeout: Duration,
    /// Progress value pinned on a task re-queued by `pause()`.
    pub paused_progress: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_items: DEFAULT_MIN_ITEMS,
            wait_attempts: DEFAULT_WAIT_ATTEMPTS,
            wait_unit: DEFAULT_WAIT_UNIT,
            early_exit_after_attempt: DEFAULT_EARLY_EXIT_AFTER_ATTEMPT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            cooldown: DEFAULT_COOLDOWN,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            paused_progress: DEFAULT_PAUSED_PROGRESS,
        }
    }
}

impl QueueConfig {
    /// Validates values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for a zero item threshold, zero
    /// attempts, a zero fetch timeout or a paused progress outside `(0, 0.1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_items == 0 {
            return Err(ConfigError::OutOfRange {
                field: "min_items",
                reason: "must be at least 1",
            });
        }
        if self.wait_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "wait_attempts",
                reason: "must be at least 1",
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "fetch_timeout",
                reason: "must be greater than zero",
            });
        }
        if !(self.paused_progress > 0.0 && self.paused_progress <= 0.1) {
            return Err(ConfigError::OutOfRange {
                field: "paused_progress",
                reason: "must be in (0, 0.1]",
            });
        }
        Ok(())
    }
}
