//! Title records and their structured metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Chapter;

/// Known metadata fields scraped for a title.
///
/// Every field is optional. Values are normalized at the persistence
/// boundary: surrounding whitespace is trimmed and empty strings are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleMetadata {
    /// Author credit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Artist credit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Publication status ("Ongoing", "Completed", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Cover image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Synopsis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Comma separated genre list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
}

impl TitleMetadata {
    /// Returns a copy with trimmed values and empty values removed.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            author: normalize_field(self.author.as_deref()),
            artist: normalize_field(self.artist.as_deref()),
            status: normalize_field(self.status.as_deref()),
            cover_url: normalize_field(self.cover_url.as_deref()),
            description: normalize_field(self.description.as_deref()),
            genres: normalize_field(self.genres.as_deref()),
        }
    }

    /// Returns the genre list split on commas.
    #[must_use]
    pub fn genre_list(&self) -> Vec<String> {
        self.genres
            .as_deref()
            .map(|genres| {
                genres
                    .split(',')
                    .map(str::trim)
                    .filter(|genre| !genre.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn normalize_field(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// A library entry with its chapter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    /// Stable identifier; also the JSON file name.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Series page URL on the source site.
    pub source_url: String,
    /// Scraped metadata.
    #[serde(default)]
    pub metadata: TitleMetadata,
    /// Chapters in source order (usually newest first).
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    /// Chapter URLs the reader hid; bulk enqueue skips them.
    #[serde(default)]
    pub hidden_chapter_urls: BTreeSet<String>,
}

impl Title {
    /// Creates an empty title.
    #[must_use]
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_url: source_url.into(),
            metadata: TitleMetadata::default(),
            chapters: Vec::new(),
            hidden_chapter_urls: BTreeSet::new(),
        }
    }

    /// Returns the chapter with the given id.
    #[must_use]
    pub fn chapter(&self, chapter_id: Uuid) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    /// Returns the chapter with the given id for mutation.
    pub fn chapter_mut(&mut self, chapter_id: Uuid) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == chapter_id)
    }

    /// Returns the first chapter with the given number.
    #[must_use]
    pub fn chapter_by_number(&self, number: f64) -> Option<&Chapter> {
        self.chapters
            .iter()
            .find(|c| (c.chapter_number - number).abs() < f64::EPSILON)
    }

    /// Number of chapters stored locally.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.is_downloaded).count()
    }

    /// Returns a copy with normalized metadata, as written to disk.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut title = self.clone();
        title.name = title.name.trim().to_string();
        title.metadata = title.metadata.normalized();
        title
    }
}
