//! `info.json` written next to a downloaded chapter's pages.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::library::Chapter;

/// Summary of a stored chapter download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterManifest {
    /// Chapter identifier (also the directory name).
    pub chapter_id: Uuid,
    /// Chapter number.
    pub chapter_number: f64,
    /// Chapter title, if any.
    pub title: Option<String>,
    /// Reader page the images were extracted from.
    pub url: String,
    /// Number of page files written.
    pub total_images: u32,
    /// Total bytes of the page files.
    pub file_size: u64,
    /// Download time in epoch seconds.
    pub download_date: i64,
    /// Minimum page count in force for this download.
    pub minimum_images_required: u32,
}

impl ChapterManifest {
    /// Builds the manifest for a download finishing now.
    #[must_use]
    pub fn for_chapter(
        chapter: &Chapter,
        total_images: u32,
        file_size: u64,
        minimum_images_required: u32,
    ) -> Self {
        Self {
            chapter_id: chapter.id,
            chapter_number: chapter.chapter_number,
            title: chapter.title.clone(),
            url: chapter.url.clone(),
            total_images,
            file_size,
            download_date: Utc::now().timestamp(),
            minimum_images_required,
        }
    }
}
