//! Backoff schedule for page image fetches.
//!
//! Image hosts fail in three ways that matter here: a hiccup that clears up
//! (timeouts, 5xx, dropped connections), throttling (429), and refusals that
//! never clear up (404, hotlink-protected 403, TLS trouble). [`classify_error`]
//! sorts a [`FetchError`] into one of those and [`RetryPolicy::should_retry`]
//! turns the class plus the attempt count into a [`RetryDecision`].
//!
//! ```
//! use chapterdl_core::{FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::default();
//! let error = FetchError::http_status("https://cdn.example.com/1.jpg", 503);
//!
//! if let RetryDecision::Retry { delay, attempt } = policy.should_retry(classify_error(&error), 1) {
//!     println!("attempt {attempt} in {delay:?}");
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::FetchError;

/// Attempts per image, counting the first one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

// Fetches already sit inside the per-item timeout, keep the ceiling low.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Throttled hosts wait this many times the normal step.
const RATE_LIMIT_FACTOR: u32 = 2;

const MAX_JITTER_MS: u64 = 250;

/// How a failed fetch is expected to behave if repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Likely to clear up: timeouts, 408, 5xx, connection resets.
    Transient,
    /// Will fail again: missing image, hotlink refusal, bad URL, TLS.
    Permanent,
    /// Host asked us to slow down (429).
    RateLimited,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        delay: Duration,
        /// Number of the attempt about to run (the first retry is 2).
        attempt: u32,
    },
    DoNotRetry {
        reason: String,
    },
}

/// Exponential backoff with jitter, capped at `max_delay`.
///
/// Step `n` (1-indexed) waits `base_delay * multiplier^(n-1)`, doubled for
/// throttled hosts, then capped, plus up to 250ms of jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            2.0,
        )
    }
}

impl RetryPolicy {
    /// Custom schedule. `max_attempts` is raised to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, multiplier: f32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier,
        }
    }

    /// Default delays with a different attempt limit.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what to do after attempt number `attempt` failed.
    pub fn should_retry(&self, failure: FailureType, attempt: u32) -> RetryDecision {
        if failure == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure, the host will refuse again".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("all {} attempts exhausted", self.max_attempts),
            };
        }

        let mut step = self.backoff_step(attempt);
        if failure == FailureType::RateLimited {
            step = step.saturating_mul(RATE_LIMIT_FACTOR).min(self.max_delay);
        }
        let delay = step + jitter();
        debug!(attempt, ?failure, delay_ms = delay.as_millis(), "scheduling fetch retry");

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff before jitter, already capped.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn backoff_step(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_millis() as f64 * f64::from(self.multiplier).powi(exponent);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS))
}

/// Sorts a fetch error into a [`FailureType`].
///
/// 408 and 5xx are transient, 429 is throttling, every other status is
/// permanent. Timeouts and plain network errors are transient unless the
/// error text points at TLS. Oversized images never shrink on retry.
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => match *status {
            429 => FailureType::RateLimited,
            408 | 500..=599 => FailureType::Transient,
            _ => FailureType::Permanent,
        },
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { source, .. } if looks_like_tls(source) => FailureType::Permanent,
        FetchError::Network { .. } => FailureType::Transient,
        FetchError::InvalidUrl { .. } | FetchError::TooLarge { .. } => FailureType::Permanent,
    }
}

fn looks_like_tls(error: &reqwest::Error) -> bool {
    let text = error.to_string().to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| text.contains(needle))
}
