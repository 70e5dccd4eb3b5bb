//! Constants for the download module (timeouts, progress phases).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout for one page image (60 seconds).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Progress of a task that just started; also the ETA baseline.
pub const PROGRESS_FLOOR: f64 = 0.1;

/// Progress at which the extraction phase ends and fetching begins.
pub const FETCH_PHASE_START: f64 = 0.5;
