//! Shared User-Agent string for page and image requests.

/// Default User-Agent for extractor and fetcher requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("chapterdl/{version} (offline-reader)")
}
