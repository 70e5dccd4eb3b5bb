//! Chapter download pipeline.
//!
//! For one chapter the pipeline:
//!
//! - opens an extraction session and waits for the page to settle
//!   ([`wait`] policy: linear backoff, early exit, best result kept)
//! - fetches the page images in reading order through a per-run cache
//! - drops unusable images and enforces the minimum page count
//! - writes the pages and `info.json` to the store
//!
//! Progress goes to the queue manager over a channel and every suspension
//! point honors the run's pause/cancel signal.

mod cache;
mod client;
pub(crate) mod constants;
pub(crate) mod control;
mod error;
pub(crate) mod pipeline;
pub(crate) mod progress;
mod retry;
mod wait;

pub use cache::CachingFetcher;
pub use client::{ContentFetcher, FetchConfig, HttpContentFetcher};
pub use error::{FetchError, PipelineError};
pub use progress::{FETCH_PHASE_START, PROGRESS_FLOOR, estimate_remaining};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

// Note: no module-local Result alias; signatures spell out `Result<T, FetchError>`.
