//! JSON-on-disk implementation of [`PersistentStore`].
//!
//! Layout under the data directory:
//!
//! ```text
//! <root>/Titles/<title-uuid>.json
//! <root>/download_state.json
//! <root>/Downloads/<chapter-uuid>/0.jpg, 1.jpg, ..., info.json
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{ChapterManifest, PersistentStore, StoreError};
use crate::library::Title;
use crate::queue::QueueSnapshot;

const TITLES_DIR: &str = "Titles";
const DOWNLOADS_DIR: &str = "Downloads";
const STATE_FILE: &str = "download_state.json";
const MANIFEST_FILE: &str = "info.json";

/// File system store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a chapter's pages and manifest.
    #[must_use]
    pub fn chapter_dir(&self, chapter_id: Uuid) -> PathBuf {
        self.root.join(DOWNLOADS_DIR).join(chapter_id.to_string())
    }

    fn title_path(&self, title_id: Uuid) -> PathBuf {
        self.root.join(TITLES_DIR).join(format!("{title_id}.json"))
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corrupt(path, e))
}

/// Writes `value` to a sibling temp file, then renames it over `path`.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::encode(path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

async fn remove_dir_if_present(dir: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(dir, e)),
    }
}

#[async_trait]
impl PersistentStore for FsStore {
    async fn load_state(&self) -> Result<Option<QueueSnapshot>, StoreError> {
        read_json(&self.state_path()).await
    }

    #[instrument(skip(self, snapshot), fields(queued = snapshot.queue.len()))]
    async fn save_state(&self, snapshot: &QueueSnapshot) -> Result<(), StoreError> {
        write_json_atomic(&self.state_path(), snapshot).await
    }

    async fn load_title(&self, title_id: Uuid) -> Result<Option<Title>, StoreError> {
        let title: Option<Title> = read_json(&self.title_path(title_id)).await?;
        Ok(title.map(|t| t.normalized()))
    }

    #[instrument(skip(self, title), fields(title_id = %title.id))]
    async fn save_title(&self, title: &Title) -> Result<(), StoreError> {
        write_json_atomic(&self.title_path(title.id), &title.normalized()).await
    }

    async fn list_titles(&self) -> Result<Vec<Title>, StoreError> {
        let dir = self.root.join(TITLES_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut titles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Title>(&path).await {
                Ok(Some(title)) => titles.push(title.normalized()),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable title"),
            }
        }
        titles.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(titles)
    }

    #[instrument(skip(self, manifest, pages), fields(chapter_id = %manifest.chapter_id, pages = pages.len()))]
    async fn write_chapter(
        &self,
        manifest: &ChapterManifest,
        pages: &[&[u8]],
    ) -> Result<u64, StoreError> {
        let dir = self.chapter_dir(manifest.chapter_id);
        remove_dir_if_present(&dir).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let mut total: u64 = 0;
        for (index, page) in pages.iter().enumerate() {
            let path = dir.join(format!("{index}.jpg"));
            tokio::fs::write(&path, *page)
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            total += page.len() as u64;
        }

        write_json_atomic(&dir.join(MANIFEST_FILE), manifest).await?;
        debug!(bytes = total, "chapter written");
        Ok(total)
    }

    async fn remove_chapter(&self, chapter_id: Uuid) -> Result<bool, StoreError> {
        remove_dir_if_present(&self.chapter_dir(chapter_id)).await
    }
}
