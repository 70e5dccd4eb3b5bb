//! Static HTML page extractor.
//!
//! Fetches the chapter page once per [`load`](ExtractionSession::load),
//! parses it with `scraper` and lists `<img>` elements that declare both
//! `width` and `height`. Pages that build their reader with scripts need a
//! rendering extractor instead.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{ContentItem, ExtractError, ExtractionSession, PageExtractor};
use crate::download::constants::CONNECT_TIMEOUT_SECS;
use crate::user_agent;

#[allow(clippy::expect_used)]
static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("img selector is valid")); // Static pattern, safe to panic

/// [`PageExtractor`] over plain HTTP and HTML parsing.
#[derive(Debug, Clone)]
pub struct StaticHtmlExtractor {
    client: Client,
}

impl StaticHtmlExtractor {
    /// Creates an extractor whose page requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Unavailable`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| ExtractError::unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates an extractor over an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageExtractor for StaticHtmlExtractor {
    async fn open_session(&self) -> Result<Arc<dyn ExtractionSession>, ExtractError> {
        let (stop_tx, _) = watch::channel(false);
        Ok(Arc::new(HtmlSession {
            client: self.client.clone(),
            stop_tx,
        }))
    }
}

struct HtmlSession {
    client: Client,
    stop_tx: watch::Sender<bool>,
}

impl HtmlSession {
    async fn fetch_page(&self, url: &Url) -> Result<String, ExtractError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ExtractError::load(url.as_str(), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::load(url.as_str(), format!("HTTP {}", status.as_u16())));
        }
        response
            .text()
            .await
            .map_err(|e| ExtractError::load(url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl ExtractionSession for HtmlSession {
    #[instrument(skip(self), fields(url = %url))]
    async fn load(&self, url: &Url) -> Result<Option<Vec<ContentItem>>, ExtractError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return Ok(None);
        }

        let body = tokio::select! {
            body = self.fetch_page(url) => body?,
            () = stop_requested(&mut stop_rx) => {
                debug!("load aborted by stop");
                return Ok(None);
            }
        };

        let items = parse_images(url, &body);
        debug!(found = items.len(), "page scanned");
        Ok(Some(items))
    }

    async fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

/// Lists sized `<img>` elements of `html` in document order.
///
/// `data-src` wins over `src` so lazy-loading readers resolve to the real
/// image. Relative sources are resolved against `base`. The element's index
/// among all images is its document position.
pub(crate) fn parse_images(base: &Url, html: &str) -> Vec<ContentItem> {
    let document = Html::parse_document(html);
    document
        .select(&IMG)
        .enumerate()
        .filter_map(|(index, element)| {
            let img = element.value();
            let src = img
                .attr("data-src")
                .or_else(|| img.attr("src"))
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.starts_with("data:"))?;
            let width = parse_dimension(img.attr("width")?)?;
            let height = parse_dimension(img.attr("height")?)?;
            let resolved = base.join(src).ok()?;
            trace!(src = %resolved, width, height, "image element");
            #[allow(clippy::cast_precision_loss)]
            let position = index as f64;
            Some(ContentItem::new(resolved.as_str(), width, height, position))
        })
        .collect()
}

fn parse_dimension(value: &str) -> Option<i64> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://reader.example.com/series/ch-1/").unwrap()
    }

    #[test]
    fn test_parse_images_keeps_document_order_and_resolves_urls() {
        let html = r#"
            <div class="page"><img src="p1.jpg" width="800" height="1200"></div>
            <div class="page"><IMG SRC='/abs/p2.jpg' WIDTH='800' HEIGHT='1200'/></div>
            <img src=https://cdn.example.com/p3.jpg width=800px height=1200>
        "#;

        let items = parse_images(&base(), html);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].source_url, "https://reader.example.com/series/ch-1/p1.jpg");
        assert_eq!(items[1].source_url, "https://reader.example.com/abs/p2.jpg");
        assert_eq!(items[2].source_url, "https://cdn.example.com/p3.jpg");
        assert!(items[0].document_position < items[1].document_position);
        assert!(items[1].document_position < items[2].document_position);
        assert_eq!(items[2].width, 800);
    }

    #[test]
    fn test_parse_images_skips_unsized_and_inline_images() {
        let html = r#"
            <img src="logo.png">
            <img src="data:image/png;base64,AAAA" width="1" height="1">
            <img src="ad.jpg" width="300">
            <img src="page.jpg" width="700" height="1000">
        "#;

        let items = parse_images(&base(), html);

        assert_eq!(items.len(), 1);
        assert!(items[0].source_url.ends_with("page.jpg"));
    }

    #[test]
    fn test_parse_images_prefers_lazy_source() {
        let html = r#"<img src="placeholder.gif" data-src="real.jpg" width="10" height="20">"#;
        let items = parse_images(&base(), html);
        assert!(items[0].source_url.ends_with("real.jpg"));
    }

    #[test]
    fn test_parse_images_tolerates_angle_bracket_in_attribute() {
        let html = r#"<img alt="page 1 > cover" src="/p/1.jpg" width="800" height="1200"><img src="/p/2.jpg" width="800" height="1200">"#;

        let items = parse_images(&base(), html);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_url, "https://reader.example.com/p/1.jpg");
        assert_eq!(items[1].source_url, "https://reader.example.com/p/2.jpg");
    }

    #[test]
    fn test_zero_dimensions_are_reported_not_filtered() {
        let html = r#"<img src="hidden.jpg" width="0" height="0">"#;
        let items = parse_images(&base(), html);
        assert_eq!(items.len(), 1);
        assert!(!items[0].has_visible_size());
    }

    #[tokio::test]
    async fn test_stopped_session_returns_none() {
        let extractor = StaticHtmlExtractor::with_client(Client::new());
        let session = extractor.open_session().await.unwrap();
        session.stop().await;

        let result = session.load(&base()).await.unwrap();

        assert!(result.is_none());
    }
}
