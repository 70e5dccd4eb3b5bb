//! Page extraction contract.
//!
//! A [`PageExtractor`] renders a chapter page in some sandboxed context and
//! reports the page images it finds as [`ContentItem`]s. The queue manager
//! opens one [`ExtractionSession`] per active download, calls
//! [`ExtractionSession::load`] repeatedly while the page settles, and stops the
//! session when the download ends or is interrupted.

mod html;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use html::StaticHtmlExtractor;

/// One image found on a chapter page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Absolute image URL.
    pub source_url: String,
    /// Rendered width in pixels.
    pub width: i64,
    /// Rendered height in pixels.
    pub height: i64,
    /// Vertical position in the document; lower values are read first.
    pub document_position: f64,
}

impl ContentItem {
    /// Creates an item.
    #[must_use]
    pub fn new(source_url: impl Into<String>, width: i64, height: i64, document_position: f64) -> Self {
        Self {
            source_url: source_url.into(),
            width,
            height,
            document_position,
        }
    }

    /// True when both dimensions are positive.
    #[must_use]
    pub fn has_visible_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Errors reported by extractors.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// No session could be created.
    #[error("page extractor unavailable: {message}")]
    Unavailable {
        /// Why the session could not be created.
        message: String,
    },

    /// A page load or extraction routine failed.
    #[error("failed to load {url}: {message}")]
    Load {
        /// The page URL.
        url: String,
        /// What went wrong.
        message: String,
    },
}

impl ExtractError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a load error.
    pub fn load(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Factory for extraction sessions.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Opens a fresh session.
    async fn open_session(&self) -> Result<Arc<dyn ExtractionSession>, ExtractError>;
}

/// A live page rendering context.
#[async_trait]
pub trait ExtractionSession: Send + Sync {
    /// Loads `url` (or re-reads the already loaded page) and runs extraction.
    ///
    /// `Ok(None)` means the page has nothing to report yet, including after
    /// [`stop`](Self::stop) was called.
    async fn load(&self, url: &Url) -> Result<Option<Vec<ContentItem>>, ExtractError>;

    /// Aborts in-flight loads and releases the rendering context.
    async fn stop(&self);
}
