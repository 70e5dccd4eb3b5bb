//! Titles, chapters and the mutations front ends perform on them.
//!
//! [`Library`] serializes writes to title records so the queue manager and a
//! front end can update different chapters of one title without losing
//! either change, and publishes a [`LibraryEvent`] after each write.

mod chapter;
mod title;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub use chapter::Chapter;
pub use title::{Title, TitleMetadata};

use crate::events::{EventBus, LibraryEvent};
use crate::store::{PersistentStore, StoreError};

/// Title store front end. Cloning shares the store, bus and write lock.
#[derive(Clone)]
pub struct Library {
    store: Arc<dyn PersistentStore>,
    events: EventBus,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").finish_non_exhaustive()
    }
}

impl Library {
    /// Creates a library over `store`, publishing on `events`.
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Event bus this library publishes on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Loads one title.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record exists but cannot be read.
    pub async fn title(&self, title_id: Uuid) -> Result<Option<Title>, StoreError> {
        self.store.load_title(title_id).await
    }

    /// Loads every title, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the titles directory cannot be listed.
    pub async fn titles(&self) -> Result<Vec<Title>, StoreError> {
        self.store.list_titles().await
    }

    /// Creates or replaces a title record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    #[instrument(skip(self, title), fields(title_id = %title.id))]
    pub async fn save_title(&self, title: &Title) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.save_title(title).await?;
        self.events
            .publish(LibraryEvent::TitleUpdated { title_id: title.id });
        Ok(())
    }

    /// Adds a new title from its JSON description and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    pub async fn import_title(&self, title: Title) -> Result<Title, StoreError> {
        let title = title.normalized();
        self.save_title(&title).await?;
        info!(
            title = %title.name,
            chapters = title.chapters.len(),
            "imported title"
        );
        Ok(title)
    }

    /// Finds the title owning `chapter_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the titles cannot be listed.
    pub async fn find_chapter(
        &self,
        chapter_id: Uuid,
    ) -> Result<Option<(Title, Chapter)>, StoreError> {
        let titles = self.store.list_titles().await?;
        Ok(titles.into_iter().find_map(|title| {
            let chapter = title.chapter(chapter_id).cloned()?;
            Some((title, chapter))
        }))
    }

    /// Applies `update` to the chapter with `chapter_id` and saves its title.
    ///
    /// Returns the owning title id, or `None` when no title holds the chapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the titles cannot be read or written.
    pub async fn update_chapter<F>(
        &self,
        chapter_id: Uuid,
        update: F,
    ) -> Result<Option<Uuid>, StoreError>
    where
        F: FnOnce(&mut Chapter) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let titles = self.store.list_titles().await?;
        let Some(mut title) = titles
            .into_iter()
            .find(|title| title.chapter(chapter_id).is_some())
        else {
            debug!(%chapter_id, "chapter not in library");
            return Ok(None);
        };

        if let Some(chapter) = title.chapter_mut(chapter_id) {
            update(chapter);
        }
        self.store.save_title(&title).await?;
        self.events
            .publish(LibraryEvent::TitleUpdated { title_id: title.id });
        Ok(Some(title.id))
    }

    /// Sets the read flag of a chapter. Returns false when the chapter is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the title cannot be read or written.
    pub async fn set_chapter_read(&self, chapter_id: Uuid, is_read: bool) -> Result<bool, StoreError> {
        let title_id = self
            .update_chapter(chapter_id, |chapter| chapter.is_read = is_read)
            .await?;
        let Some(title_id) = title_id else {
            return Ok(false);
        };
        self.events.publish(LibraryEvent::ChapterReadStatusChanged {
            title_id,
            chapter_id,
            is_read,
        });
        Ok(true)
    }

    /// Removes a chapter's stored pages and clears its download fields.
    ///
    /// Returns false when the chapter is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when files or the title record cannot be updated.
    #[instrument(skip(self))]
    pub async fn delete_chapter_download(&self, chapter_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.store.remove_chapter(chapter_id).await?;
        let title_id = self
            .update_chapter(chapter_id, Chapter::clear_download)
            .await?;
        debug!(removed, "chapter download deleted");
        Ok(title_id.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use tempfile::TempDir;

    fn library(temp: &TempDir) -> Library {
        Library::new(Arc::new(FsStore::new(temp.path())), EventBus::new())
    }

    fn title_with_chapters(count: usize) -> Title {
        let mut title = Title::new("Series", "https://example.com/series");
        title.chapters = (1..=count)
            .map(|n| Chapter::new(n as f64, format!("https://example.com/ch/{n}")))
            .collect();
        title
    }

    #[tokio::test]
    async fn test_import_title_publishes_update() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let mut rx = library.events().subscribe();

        let title = library.import_title(title_with_chapters(2)).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            LibraryEvent::TitleUpdated { title_id: title.id }
        );
        assert_eq!(library.titles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_chapter_read_persists_and_notifies() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let title = library.import_title(title_with_chapters(2)).await.unwrap();
        let chapter_id = title.chapters[1].id;
        let mut rx = library.events().subscribe();

        assert!(library.set_chapter_read(chapter_id, true).await.unwrap());

        let stored = library.title(title.id).await.unwrap().unwrap();
        assert!(stored.chapter(chapter_id).unwrap().is_read);
        assert!(!stored.chapters[0].is_read);

        let mut saw_read_event = false;
        while let Ok(event) = rx.try_recv() {
            if event
                == (LibraryEvent::ChapterReadStatusChanged {
                    title_id: title.id,
                    chapter_id,
                    is_read: true,
                })
            {
                saw_read_event = true;
            }
        }
        assert!(saw_read_event);
    }

    #[tokio::test]
    async fn test_unknown_chapter_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        library.import_title(title_with_chapters(1)).await.unwrap();

        assert!(!library.set_chapter_read(Uuid::new_v4(), true).await.unwrap());
        assert!(
            library
                .update_chapter(Uuid::new_v4(), |c| c.is_read = true)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_one_title_are_both_kept() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let title = library.import_title(title_with_chapters(2)).await.unwrap();
        let (a, b) = (title.chapters[0].id, title.chapters[1].id);

        let (left, right) = tokio::join!(
            library.update_chapter(a, |c| c.mark_downloaded(9, 90)),
            library.set_chapter_read(b, true),
        );
        left.unwrap();
        right.unwrap();

        let stored = library.title(title.id).await.unwrap().unwrap();
        assert!(stored.chapter(a).unwrap().is_downloaded);
        assert!(stored.chapter(b).unwrap().is_read);
    }

    #[tokio::test]
    async fn test_delete_chapter_download_clears_fields() {
        let temp = TempDir::new().unwrap();
        let library = library(&temp);
        let title = library.import_title(title_with_chapters(1)).await.unwrap();
        let chapter_id = title.chapters[0].id;
        library
            .update_chapter(chapter_id, |c| c.mark_downloaded(9, 900))
            .await
            .unwrap();

        assert!(library.delete_chapter_download(chapter_id).await.unwrap());

        let stored = library.title(title.id).await.unwrap().unwrap();
        let chapter = stored.chapter(chapter_id).unwrap();
        assert!(!chapter.is_downloaded);
        assert!(chapter.file_size_bytes.is_none());
    }
}
