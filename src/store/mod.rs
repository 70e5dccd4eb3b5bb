//! Persistence for titles, queue state and downloaded chapters.
//!
//! The queue manager and the library only talk to [`PersistentStore`]; the
//! file backed [`FsStore`] is the default implementation. Tests substitute
//! in-memory stores through the same trait.

mod error;
mod fs;
mod manifest;

use async_trait::async_trait;
use uuid::Uuid;

pub use error::StoreError;
pub use fs::FsStore;
pub use manifest::ChapterManifest;

use crate::library::Title;
use crate::queue::QueueSnapshot;

/// Storage port used by the library and the download queue.
///
/// Writes must be atomic per record: a crash mid-write leaves either the old
/// or the new version on disk, never a truncated file.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Loads the saved queue state. `Ok(None)` when nothing was saved yet.
    async fn load_state(&self) -> Result<Option<QueueSnapshot>, StoreError>;

    /// Replaces the saved queue state.
    async fn save_state(&self, snapshot: &QueueSnapshot) -> Result<(), StoreError>;

    /// Loads one title by id.
    async fn load_title(&self, title_id: Uuid) -> Result<Option<Title>, StoreError>;

    /// Creates or replaces a title record.
    async fn save_title(&self, title: &Title) -> Result<(), StoreError>;

    /// Loads every stored title.
    async fn list_titles(&self) -> Result<Vec<Title>, StoreError>;

    /// Replaces the stored pages of a chapter, writing them in order and the
    /// manifest last. Returns the number of page bytes written.
    async fn write_chapter(
        &self,
        manifest: &ChapterManifest,
        pages: &[&[u8]],
    ) -> Result<u64, StoreError>;

    /// Removes a chapter's stored pages. Returns true when anything was removed.
    async fn remove_chapter(&self, chapter_id: Uuid) -> Result<bool, StoreError>;
}
