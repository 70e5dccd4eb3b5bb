//! Error types for queue operations.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Caller-facing errors of [`DownloadQueueManager`](super::DownloadQueueManager).
#[derive(Debug, Error)]
pub enum QueueError {
    /// No task exists for the chapter.
    #[error("no download task for chapter {0}\n  Suggestion: Run `chapterdl status` to list task chapter ids")]
    TaskNotFound(Uuid),

    /// The task exists but is not in the failed list.
    #[error("download task for chapter {0} has not failed; only failed tasks can be retried")]
    NotFailed(Uuid),

    /// The queue configuration was rejected.
    #[error("invalid queue configuration: {0}")]
    Config(#[from] ConfigError),

    /// Loading persisted state failed.
    #[error("queue storage error: {0}")]
    Store(#[from] StoreError),
}
