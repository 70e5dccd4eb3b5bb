//! Chapter Downloader Core Library
//!
//! This library provides the download orchestration behind `chapterdl`:
//! a single-pipeline queue that extracts page images from chapter URLs,
//! fetches them in reading order and stores them for offline reading.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`queue`] - Download queue manager, tasks and their state machine
//! - [`download`] - Per-chapter pipeline: extraction wait, fetch, progress
//! - [`extract`] - Page extractor contract and a static HTML adapter
//! - [`store`] - JSON persistence for titles, queue state and chapter files
//! - [`library`] - Title and chapter records and their mutations
//! - [`events`] - Library/queue change notifications
//! - [`config`] - Queue tuning knobs

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod events;
pub mod extract;
pub mod library;
pub mod queue;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_MIN_ITEMS, QueueConfig};
pub use download::{
    CachingFetcher, ContentFetcher, DEFAULT_MAX_RETRIES, FETCH_PHASE_START, FailureType,
    FetchConfig, FetchError, HttpContentFetcher, PROGRESS_FLOOR, PipelineError, RetryDecision,
    RetryPolicy, classify_error, estimate_remaining,
};
pub use events::{EventBus, LibraryEvent};
pub use extract::{ContentItem, ExtractError, ExtractionSession, PageExtractor, StaticHtmlExtractor};
pub use library::{Chapter, Library, Title, TitleMetadata};
pub use queue::{DownloadQueueManager, DownloadTask, QueueError, QueueSnapshot, TaskStatus};
pub use store::{ChapterManifest, FsStore, PersistentStore, StoreError};
