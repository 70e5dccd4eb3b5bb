//! Error types for the download module.
//!
//! [`FetchError`] describes a single content fetch; [`PipelineError`] is the
//! outcome of a whole chapter pipeline and is what ends up on a failed task.

use thiserror::Error;

use crate::store::StoreError;

/// Failure to fetch one page image.
///
/// Every variant carries the image URL so per-item warnings in the pipeline
/// log can point at the page that was dropped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure: DNS, refused connection, TLS, a body cut
    /// off mid-stream.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The image did not arrive within the per-item timeout.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The image host answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// Not an absolute `http`/`https` URL.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The body grew past the per-image size limit.
    #[error("image at {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: usize },
}

impl FetchError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn too_large(url: impl Into<String>, limit: usize) -> Self {
        Self::TooLarge {
            url: url.into(),
            limit,
        }
    }

    /// The image URL this error is about.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::InvalidUrl { url }
            | Self::TooLarge { url, .. } => url,
        }
    }
}

/// Why a chapter pipeline did not produce a stored chapter.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The chapter URL is not an absolute http(s) URL with a host.
    #[error("invalid chapter URL: {url}\n  Suggestion: Re-import the title to refresh chapter links")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// No extraction session could be opened.
    #[error("page extractor unavailable: {message}")]
    ExtractorUnavailable {
        /// Extractor-provided reason.
        message: String,
    },

    /// Too few usable page images.
    #[error("insufficient content: found {found} images, {required} required")]
    InsufficientContent {
        /// Images found (or surviving the fetch).
        found: usize,
        /// Minimum required.
        required: usize,
    },

    /// A single item could not be fetched. Logged and dropped by the pipeline.
    #[error("failed to fetch page image: {0}")]
    FetchFailure(#[source] FetchError),

    /// The chapter files could not be written.
    #[error("failed to store chapter: {0}")]
    Persistence(#[source] StoreError),

    /// The run was cancelled.
    #[error("download cancelled")]
    Cancelled,

    /// The run was interrupted by a queue pause.
    #[error("download paused")]
    Paused,
}

impl PipelineError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an insufficient content error.
    #[must_use]
    pub fn insufficient(found: usize, required: usize) -> Self {
        Self::InsufficientContent { found, required }
    }

    /// True for cooperative interruptions that must not fail the task.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Paused)
    }
}

// Note: no `From<reqwest::Error>`; every variant needs the URL for context.
