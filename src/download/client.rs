//! Content fetcher contract and its HTTP implementation.
//!
//! [`HttpContentFetcher`] downloads page images into memory with connection
//! pooling, per-request timeouts and retry of transient failures.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::FetchError;
use super::retry::{DEFAULT_MAX_RETRIES, RetryDecision, RetryPolicy, classify_error};
use crate::user_agent;

/// Default largest single page image accepted (64 MiB).
const MAX_ITEM_BYTES: usize = 64 * 1024 * 1024;

/// Downloads raw bytes for a content item URL.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches the full body of `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Timeouts and retry limits for [`HttpContentFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// Attempts per URL, including the first.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// HTTP [`ContentFetcher`].
///
/// Create once and share; the underlying client pools connections.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: Client,
    retry: RetryPolicy,
    max_item_bytes: usize,
}

impl HttpContentFetcher {
    /// Creates a fetcher from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] when the HTTP client cannot be built.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| FetchError::network("<client>", e))?;
        Ok(Self::with_client(client, config.max_retries))
    }

    /// Creates a fetcher over an existing client.
    #[must_use]
    pub fn with_client(client: Client, max_retries: u32) -> Self {
        Self {
            client,
            retry: RetryPolicy::with_max_attempts(max_retries),
            max_item_bytes: MAX_ITEM_BYTES,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Caps the size of a single image body.
    #[must_use]
    pub fn with_max_item_bytes(mut self, limit: usize) -> Self {
        self.max_item_bytes = limit;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let capacity = response
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0)
            .min(self.max_item_bytes);
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;
            if body.len() + chunk.len() > self.max_item_bytes {
                warn!(limit = self.max_item_bytes, "page image exceeds size limit");
                return Err(FetchError::too_large(url, self.max_item_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::invalid_url(url));
        }

        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(bytes = body.len(), attempt, "fetched");
                    return Ok(body);
                }
                Err(error) => match self.retry.should_retry(classify_error(&error), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        debug!(error = %error, delay_ms = delay.as_millis(), "retrying fetch");
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(error = %error, %reason, "giving up on fetch");
                        return Err(error);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_urls() {
        let fetcher = HttpContentFetcher::new(&FetchConfig::default()).unwrap();
        for url in ["not a url", "ftp://example.com/1.jpg", "file:///etc/passwd"] {
            assert!(
                matches!(fetcher.fetch(url).await, Err(FetchError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }
}
