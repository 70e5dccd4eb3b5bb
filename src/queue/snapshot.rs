//! Persisted form of the queue lists and crash recovery.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::task::{DownloadTask, TaskStatus};

/// The three task lists as saved in `download_state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Pending tasks in FIFO order, including the active one.
    #[serde(default)]
    pub queue: Vec<DownloadTask>,
    /// Finished tasks, newest first.
    #[serde(default)]
    pub completed: Vec<DownloadTask>,
    /// Failed tasks, oldest first.
    #[serde(default)]
    pub failed: Vec<DownloadTask>,
}

impl QueueSnapshot {
    /// Total number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len() + self.completed.len() + self.failed.len()
    }

    /// True when all lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds a task by chapter id in any list.
    #[must_use]
    pub fn find(&self, chapter_id: uuid::Uuid) -> Option<&DownloadTask> {
        self.queue
            .iter()
            .chain(&self.completed)
            .chain(&self.failed)
            .find(|task| task.chapter_id() == chapter_id)
    }

    /// Repairs state saved by a process that did not shut down cleanly.
    ///
    /// `Downloading` tasks go back to `Queued` at progress 0, `Cancelled`
    /// tasks are discarded and a chapter id seen twice keeps only its first
    /// occurrence (queue, then completed, then failed). Returns the number of
    /// tasks changed or dropped.
    pub fn recover(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut repaired = 0;

        for list in [&mut self.queue, &mut self.completed, &mut self.failed] {
            let before = list.len();
            list.retain(|task| task.status != TaskStatus::Cancelled && seen.insert(task.chapter_id()));
            repaired += before - list.len();
        }

        for task in &mut self.queue {
            if task.status == TaskStatus::Downloading {
                debug!(chapter_id = %task.chapter_id(), "resetting interrupted download");
                task.requeue(0.0);
                repaired += 1;
            } else if task.status != TaskStatus::Queued {
                warn!(chapter_id = %task.chapter_id(), status = %task.status, "unexpected status in queue, requeueing");
                task.requeue(0.0);
                repaired += 1;
            }
        }
        for task in &mut self.completed {
            task.estimated_time_remaining = None;
        }
        for task in &mut self.failed {
            if task.status != TaskStatus::Failed {
                task.status = TaskStatus::Failed;
                repaired += 1;
            }
        }

        repaired
    }
}
