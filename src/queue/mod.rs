//! Download queue: tasks, their lifecycle and the manager that runs them.
//!
//! # Overview
//!
//! - [`DownloadQueueManager`] - Serializes downloads through one pipeline
//! - [`DownloadTask`] - One chapter's download, owned by the manager
//! - [`TaskStatus`] - Task lifecycle states
//! - [`QueueSnapshot`] - The persisted `queue`/`completed`/`failed` lists
//! - [`QueueError`] - Operation error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chapterdl_core::{
//!     Chapter, DownloadQueueManager, EventBus, FetchConfig, FsStore, HttpContentFetcher,
//!     Library, QueueConfig, StaticHtmlExtractor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsStore::new("./data"));
//! let library = Library::new(store.clone(), EventBus::new());
//! let manager = DownloadQueueManager::open(
//!     Arc::new(StaticHtmlExtractor::new(Duration::from_secs(30))?),
//!     Arc::new(HttpContentFetcher::new(&FetchConfig::default())?),
//!     store,
//!     library,
//!     QueueConfig::default(),
//! )
//! .await?;
//!
//! manager.enqueue(Chapter::new(1.0, "https://reader.example.com/ch/1")).await;
//! manager.start().await;
//! manager.wait_until_idle().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod manager;
mod snapshot;
mod task;

pub use error::QueueError;
pub use manager::DownloadQueueManager;
pub use snapshot::QueueSnapshot;
pub use task::{DownloadTask, TaskStatus};
