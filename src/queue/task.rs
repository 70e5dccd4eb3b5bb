//! Download task types and status definitions.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::library::Chapter;

/// Status of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for the pipeline.
    Queued,
    /// The active task.
    Downloading,
    /// Stored successfully.
    Completed,
    /// Gave up with an error.
    Failed,
    /// Removed by the user. Never kept in a list.
    Cancelled,
}

impl TaskStatus {
    /// Returns the persisted string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Queued -> Downloading -> Completed | Failed`, `Downloading -> Queued`
    /// (pause), `Failed -> Queued` (retry) and `Queued | Downloading ->
    /// Cancelled`. Queued tasks never skip straight to a terminal state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Downloading | Self::Cancelled)
                | (
                    Self::Downloading,
                    Self::Queued | Self::Completed | Self::Failed | Self::Cancelled
                )
                | (Self::Failed, Self::Queued)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid task status: {s}")),
        }
    }
}

/// One chapter's download lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    /// Task identifier.
    pub id: Uuid,
    /// Snapshot of the chapter when it was enqueued.
    pub chapter: Chapter,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Progress in `[0, 1]`.
    pub progress: f64,
    /// Human-readable failure reason.
    #[serde(default)]
    pub error: Option<String>,
    /// When the task was created or last started.
    pub start_time: DateTime<Utc>,
    /// Estimated time left while downloading. Not persisted.
    #[serde(skip)]
    pub estimated_time_remaining: Option<Duration>,
}

impl DownloadTask {
    /// Creates a queued task for `chapter`.
    #[must_use]
    pub fn new(chapter: Chapter) -> Self {
        Self {
            id: Uuid::new_v4(),
            chapter,
            status: TaskStatus::Queued,
            progress: 0.0,
            error: None,
            start_time: Utc::now(),
            estimated_time_remaining: None,
        }
    }

    /// Chapter identifier; unique across the manager's lists.
    #[must_use]
    pub fn chapter_id(&self) -> Uuid {
        self.chapter.id
    }

    /// Moves to `Queued` with the given progress and no error.
    pub(crate) fn requeue(&mut self, progress: f64) {
        self.status = TaskStatus::Queued;
        self.progress = progress;
        self.error = None;
        self.estimated_time_remaining = None;
    }
}
