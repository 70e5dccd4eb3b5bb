//! Chapter records.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chapter of a title, persisted inside the title's JSON file.
///
/// Invariants kept by the mutators below:
/// - `downloaded_images <= total_images`
/// - `is_downloaded` implies `file_size_bytes.is_some()` and `download_progress == 1.0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Stable identifier, generated when an imported record has none.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Chapter number as published (may be fractional, e.g. 10.5).
    pub chapter_number: f64,
    /// Reader page URL for this chapter.
    pub url: String,
    /// Optional chapter title.
    #[serde(default)]
    pub title: Option<String>,
    /// Upload date as shown by the source.
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Whether the page images are stored locally.
    #[serde(default)]
    pub is_downloaded: bool,
    /// Whether the reader finished this chapter.
    #[serde(default)]
    pub is_read: bool,
    /// Last known download progress in `[0, 1]`.
    #[serde(default)]
    pub download_progress: f64,
    /// Last download error shown to the user.
    #[serde(default)]
    pub download_error: Option<String>,
    /// Number of page images of the last successful download.
    #[serde(default)]
    pub total_images: u32,
    /// Number of page images stored.
    #[serde(default)]
    pub downloaded_images: u32,
    /// Total bytes stored for this chapter.
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
}

impl Chapter {
    /// Creates a chapter that has not been downloaded or read.
    #[must_use]
    pub fn new(chapter_number: f64, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chapter_number,
            url: url.into(),
            title: None,
            upload_date: None,
            is_downloaded: false,
            is_read: false,
            download_progress: 0.0,
            download_error: None,
            total_images: 0,
            downloaded_images: 0,
            file_size_bytes: None,
        }
    }

    /// Sets the optional chapter title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Records a finished download of `images` pages totalling `bytes`.
    pub fn mark_downloaded(&mut self, images: u32, bytes: u64) {
        self.is_downloaded = true;
        self.download_progress = 1.0;
        self.download_error = None;
        self.total_images = images;
        self.downloaded_images = images;
        self.file_size_bytes = Some(bytes);
    }

    /// Forgets any stored download.
    pub fn clear_download(&mut self) {
        self.is_downloaded = false;
        self.download_progress = 0.0;
        self.downloaded_images = 0;
        self.file_size_bytes = None;
    }

    /// Records a failed download attempt.
    pub fn mark_download_failed(&mut self, error: impl Into<String>) {
        self.clear_download();
        self.download_error = Some(error.into());
    }

    /// Returns true when the record satisfies its invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let counts_ok = self.downloaded_images <= self.total_images;
        let downloaded_ok = !self.is_downloaded
            || (self.file_size_bytes.is_some()
                && (self.download_progress - 1.0).abs() < f64::EPSILON);
        counts_ok && downloaded_ok
    }

    /// Label used in logs and terminal output, e.g. `Ch. 12.5 "Title"`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("Ch. {} \"{}\"", self.chapter_number, title),
            None => format!("Ch. {}", self.chapter_number),
        }
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chapter_is_pristine() {
        let chapter = Chapter::new(3.0, "https://example.com/ch/3");
        assert!(!chapter.is_downloaded);
        assert!(!chapter.is_read);
        assert_eq!(chapter.download_progress, 0.0);
        assert!(chapter.file_size_bytes.is_none());
        assert!(chapter.is_consistent());
    }

    #[test]
    fn test_mark_downloaded_keeps_invariants() {
        let mut chapter = Chapter::new(1.0, "https://example.com/ch/1");
        chapter.download_error = Some("old".to_string());

        chapter.mark_downloaded(12, 4_096);

        assert!(chapter.is_downloaded);
        assert_eq!(chapter.file_size_bytes, Some(4_096));
        assert_eq!(chapter.download_progress, 1.0);
        assert_eq!(chapter.downloaded_images, 12);
        assert!(chapter.download_error.is_none());
        assert!(chapter.is_consistent());
    }

    #[test]
    fn test_mark_download_failed_clears_flag_and_records_error() {
        let mut chapter = Chapter::new(1.0, "https://example.com/ch/1");
        chapter.mark_downloaded(10, 100);

        chapter.mark_download_failed("not enough pages");

        assert!(!chapter.is_downloaded);
        assert!(chapter.file_size_bytes.is_none());
        assert_eq!(chapter.download_error.as_deref(), Some("not enough pages"));
        assert!(chapter.is_consistent());
    }

    #[test]
    fn test_downloaded_without_size_is_inconsistent() {
        let mut chapter = Chapter::new(1.0, "https://example.com/ch/1");
        chapter.is_downloaded = true;
        chapter.download_progress = 1.0;
        assert!(!chapter.is_consistent());
    }

    #[test]
    fn test_serde_uses_camel_case_and_tolerates_missing_fields() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"id":"{id}","chapterNumber":7.5,"url":"https://e.com/7"}}"#);
        let chapter: Chapter = serde_json::from_str(&json).unwrap();
        assert_eq!(chapter.id, id);
        assert_eq!(chapter.chapter_number, 7.5);
        assert!(!chapter.is_downloaded);

        let out = serde_json::to_string(&chapter).unwrap();
        assert!(out.contains("\"chapterNumber\":7.5"));
        assert!(out.contains("\"isDownloaded\":false"));
    }

    #[test]
    fn test_label_includes_title_when_present() {
        let chapter = Chapter::new(12.5, "https://e.com/12.5").with_title("Side Story");
        assert_eq!(chapter.label(), "Ch. 12.5 \"Side Story\"");
        assert_eq!(Chapter::new(4.0, "u").label(), "Ch. 4");
    }
}
