//! Per-run in-memory cache in front of a [`ContentFetcher`].

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::client::ContentFetcher;
use super::error::FetchError;

/// Caches successful fetches by URL. Failures are not cached.
///
/// A cache lives for one chapter run so repeated image URLs (spacer images,
/// shared credits pages) are only downloaded once. Bodies are held once and
/// handed out as shared handles.
pub struct CachingFetcher {
    inner: Arc<dyn ContentFetcher>,
    cache: DashMap<String, Arc<Vec<u8>>>,
}

impl std::fmt::Debug for CachingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFetcher")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl CachingFetcher {
    /// Wraps `inner` with an empty cache.
    #[must_use]
    pub fn new(inner: Arc<dyn ContentFetcher>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// Number of cached URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Fetches `url` through the inner fetcher unless it is already cached.
    ///
    /// # Errors
    ///
    /// Returns the inner fetcher's error; nothing is cached in that case.
    pub async fn fetch(&self, url: &str) -> Result<Arc<Vec<u8>>, FetchError> {
        if let Some(hit) = self.cache.get(url) {
            trace!(url, "cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        let body = Arc::new(self.inner.fetch(url).await?);
        self.cache.insert(url.to_string(), Arc::clone(&body));
        Ok(body)
    }
}
