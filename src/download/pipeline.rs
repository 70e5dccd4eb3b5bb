//! Per-chapter extraction and fetch pipeline.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};
use url::Url;

use super::cache::CachingFetcher;
use super::client::ContentFetcher;
use super::constants::FETCH_PHASE_START;
use super::control::RunControl;
use super::error::{FetchError, PipelineError};
use super::progress::{ProgressReporter, fetch_progress};
use super::wait::ExtractionWaitPolicy;
use crate::config::QueueConfig;
use crate::extract::{ContentItem, ExtractError, ExtractionSession, PageExtractor};
use crate::library::Chapter;
use crate::store::{ChapterManifest, PersistentStore};

/// Holds the extraction session of the active run so it can be torn down
/// from outside the pipeline.
#[derive(Clone, Default)]
pub(crate) struct SessionSlot {
    session: Arc<Mutex<Option<Arc<dyn ExtractionSession>>>>,
}

impl SessionSlot {
    fn set(&self, session: Arc<dyn ExtractionSession>) {
        *self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Removes and returns the session, if any.
    pub(crate) fn take(&self) -> Option<Arc<dyn ExtractionSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChapterDownload {
    pub(crate) images: u32,
    pub(crate) bytes: u64,
}

pub(crate) struct ChapterPipeline {
    extractor: Arc<dyn PageExtractor>,
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<dyn PersistentStore>,
    config: QueueConfig,
    wait: ExtractionWaitPolicy,
}

impl ChapterPipeline {
    pub(crate) fn new(
        extractor: Arc<dyn PageExtractor>,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn PersistentStore>,
        config: QueueConfig,
    ) -> Self {
        let wait = ExtractionWaitPolicy::from_config(&config);
        Self {
            extractor,
            fetcher,
            store,
            config,
            wait,
        }
    }

    /// Downloads `chapter` into the store.
    #[instrument(skip_all, fields(chapter_id = %chapter.id, url = %chapter.url))]
    pub(crate) async fn run(
        &self,
        chapter: &Chapter,
        control: &RunControl,
        progress: &ProgressReporter,
        slot: &SessionSlot,
    ) -> Result<ChapterDownload, PipelineError> {
        let url = validate_chapter_url(&chapter.url)?;
        control.check()?;

        let session = self
            .extractor
            .open_session()
            .await
            .map_err(|e| PipelineError::ExtractorUnavailable {
                message: match e {
                    ExtractError::Unavailable { message } => message,
                    other => other.to_string(),
                },
            })?;
        slot.set(Arc::clone(&session));

        let found = self
            .wait
            .wait_for_content(session.as_ref(), &url, control, progress)
            .await;
        session.stop().await;
        let mut items = found?;

        let required = self.config.min_items;
        if items.len() < required {
            return Err(PipelineError::insufficient(items.len(), required));
        }
        items.sort_by(|a, b| a.document_position.total_cmp(&b.document_position));
        debug!(found = items.len(), "content extracted");

        progress.report(FETCH_PHASE_START);
        let pages = self.fetch_items(&items, control, progress).await?;
        if pages.len() < required {
            return Err(PipelineError::insufficient(pages.len(), required));
        }

        control.check()?;
        let images = u32::try_from(pages.len()).unwrap_or(u32::MAX);
        let bytes: u64 = pages.iter().map(|page| page.len() as u64).sum();
        let manifest = ChapterManifest::for_chapter(
            chapter,
            images,
            bytes,
            u32::try_from(required).unwrap_or(u32::MAX),
        );
        let slices: Vec<&[u8]> = pages.iter().map(|page| page.as_slice()).collect();
        let written = self
            .store
            .write_chapter(&manifest, &slices)
            .await
            .map_err(PipelineError::Persistence)?;

        info!(images, bytes = written, "chapter stored");
        Ok(ChapterDownload {
            images,
            bytes: written,
        })
    }

    /// Fetches items in order. Items that are invisible, fail, time out or come
    /// back empty are dropped.
    async fn fetch_items(
        &self,
        items: &[ContentItem],
        control: &RunControl,
        progress: &ProgressReporter,
    ) -> Result<Vec<Arc<Vec<u8>>>, PipelineError> {
        let fetcher = CachingFetcher::new(Arc::clone(&self.fetcher));
        let total = items.len();
        let mut pages = Vec::with_capacity(total);

        for (index, item) in items.iter().enumerate() {
            control.check()?;

            if item.has_visible_size() {
                let fetch = tokio::time::timeout(
                    self.config.fetch_timeout,
                    fetcher.fetch(&item.source_url),
                );
                let failure = match control.race(fetch).await? {
                    Ok(Ok(bytes)) if !bytes.is_empty() => {
                        pages.push(bytes);
                        None
                    }
                    Ok(Ok(_)) => {
                        warn!(url = %item.source_url, "empty page image dropped");
                        None
                    }
                    Ok(Err(error)) => Some(error),
                    Err(_) => Some(FetchError::timeout(&item.source_url)),
                };
                if let Some(error) = failure {
                    let url = error.url().to_owned();
                    warn!(
                        index,
                        %url,
                        error = %PipelineError::FetchFailure(error),
                        "page image dropped"
                    );
                }
            } else {
                debug!(
                    url = %item.source_url,
                    width = item.width,
                    height = item.height,
                    "invisible item dropped"
                );
            }

            progress.report(fetch_progress(index + 1, total));
        }

        Ok(pages)
    }
}

/// Accepts absolute http(s) URLs with a host.
pub(crate) fn validate_chapter_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim()).map_err(|_| PipelineError::invalid_url(raw))?;
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if matches!(url.scheme(), "http" | "https") && has_host {
        Ok(url)
    } else {
        Err(PipelineError::invalid_url(raw))
    }
}
