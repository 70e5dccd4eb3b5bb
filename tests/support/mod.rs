//! Shared fakes and helpers for integration tests.
//!
//! `ScriptedExtractor` stands in for a page renderer and `MemoryFetcher` for
//! the image host, so queue tests run without a network.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chapterdl_core::{
    Chapter, ContentFetcher, ContentItem, DownloadQueueManager, EventBus, ExtractError,
    ExtractionSession, FetchError, FsStore, Library, LibraryEvent, PageExtractor, QueueConfig, QueueSnapshot,
    Title,
};
use tempfile::TempDir;
use tokio::sync::{broadcast, watch};
use url::Url;

/// Page renderer fake.
///
/// Every `load` returns the scripted item count for that attempt (the last
/// count repeats). While the gate is closed `load` blocks, which keeps a task
/// in `Downloading` until the test pauses, cancels or opens the gate.
pub struct ScriptedExtractor {
    counts: Vec<usize>,
    fail_open: bool,
    gate: watch::Sender<bool>,
    attempts: Arc<AtomicUsize>,
    sessions_opened: AtomicUsize,
    sessions_stopped: Arc<AtomicUsize>,
}

impl ScriptedExtractor {
    /// Returns `count` items on every attempt.
    pub fn with_items(count: usize) -> Self {
        Self::with_counts(vec![count])
    }

    /// Returns `counts[n]` items on attempt `n`.
    pub fn with_counts(counts: Vec<usize>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            counts,
            fail_open: false,
            gate,
            attempts: Arc::new(AtomicUsize::new(0)),
            sessions_opened: AtomicUsize::new(0),
            sessions_stopped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `open_session` fails.
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::with_items(0)
        }
    }

    /// Starts with the gate closed.
    pub fn blocking(count: usize) -> Self {
        let extractor = Self::with_items(count);
        extractor.gate.send_replace(false);
        extractor
    }

    /// Lets blocked and future loads through.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_stopped(&self) -> usize {
        self.sessions_stopped.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    async fn open_session(&self) -> Result<Arc<dyn ExtractionSession>, ExtractError> {
        if self.fail_open {
            return Err(ExtractError::unavailable("renderer not installed"));
        }
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            counts: self.counts.clone(),
            gate: self.gate.subscribe(),
            attempt: AtomicUsize::new(0),
            attempts: Arc::clone(&self.attempts),
            stopped: Arc::clone(&self.sessions_stopped),
        }))
    }
}

struct ScriptedSession {
    counts: Vec<usize>,
    gate: watch::Receiver<bool>,
    attempt: AtomicUsize,
    attempts: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl ExtractionSession for ScriptedSession {
    async fn load(&self, url: &Url) -> Result<Option<Vec<ContentItem>>, ExtractError> {
        let mut gate = self.gate.clone();
        if gate.wait_for(|open| *open).await.is_err() {
            return Ok(None);
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let count = self
            .counts
            .get(attempt)
            .or_else(|| self.counts.last())
            .copied()
            .unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(page_items(url, count)))
    }

    async fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// `count` sized items in reverse document order, to exercise sorting.
pub fn page_items(url: &Url, count: usize) -> Vec<ContentItem> {
    (0..count)
        .rev()
        .map(|index| {
            ContentItem::new(
                format!("{url}/page-{index}.jpg"),
                800,
                1200,
                index as f64 * 100.0,
            )
        })
        .collect()
}

/// Image host fake. Returns the URL bytes as the image body.
///
/// While the gate is closed every fetch blocks after being counted, which
/// holds a task in the fetch phase.
pub struct MemoryFetcher {
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            gate,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every URL containing `fragment` fail with a 404.
    pub fn fail_matching(&self, fragment: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(fragment.to_string());
    }

    /// Makes every URL containing `fragment` never answer.
    pub fn hang_matching(&self, fragment: &str) {
        self.hanging
            .lock()
            .unwrap()
            .insert(fragment.to_string());
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn matches_any(fragments: &Mutex<HashSet<String>>, url: &str) -> bool {
    fragments
        .lock()
        .unwrap()
        .iter()
        .any(|fragment| url.contains(fragment.as_str()))
}

#[async_trait]
impl ContentFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if matches_any(&self.hanging, url) {
            std::future::pending::<()>().await;
        }
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if matches_any(&self.failing, url) {
            return Err(FetchError::http_status(url, 404));
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Millisecond delays; the thresholds keep their defaults.
pub fn fast_config() -> QueueConfig {
    QueueConfig {
        wait_unit: Duration::from_millis(2),
        settle_delay: Duration::from_millis(5),
        cooldown: Duration::from_millis(10),
        fetch_timeout: Duration::from_secs(2),
        ..QueueConfig::default()
    }
}

/// A manager over a temp data directory with one imported title.
pub struct TestQueue {
    pub manager: DownloadQueueManager,
    pub library: Library,
    pub store: Arc<FsStore>,
    pub extractor: Arc<ScriptedExtractor>,
    pub fetcher: Arc<MemoryFetcher>,
    pub title: Title,
    pub dir: TempDir,
}

impl TestQueue {
    /// Opens a queue over a fresh directory with a title of `chapters` chapters.
    pub async fn open(extractor: ScriptedExtractor, chapters: usize) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self::open_in(dir, extractor, chapters).await
    }

    /// Like [`TestQueue::open`] with a custom queue configuration.
    pub async fn open_with_config(
        extractor: ScriptedExtractor,
        chapters: usize,
        config: QueueConfig,
    ) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self::build(dir, extractor, chapters, config).await
    }

    pub async fn open_in(dir: TempDir, extractor: ScriptedExtractor, chapters: usize) -> Self {
        Self::build(dir, extractor, chapters, fast_config()).await
    }

    async fn build(
        dir: TempDir,
        extractor: ScriptedExtractor,
        chapters: usize,
        config: QueueConfig,
    ) -> Self {
        let store = Arc::new(FsStore::new(dir.path()));
        let library = Library::new(store.clone(), EventBus::new());

        let existing = library.titles().await.expect("titles should load");
        let title = match existing.into_iter().next() {
            Some(title) => title,
            None => {
                let mut title = Title::new("Test Series", "https://reader.test/series");
                title.chapters = (1..=chapters)
                    .map(|n| Chapter::new(n as f64, format!("https://reader.test/ch/{n}")))
                    .collect();
                library
                    .import_title(title)
                    .await
                    .expect("title import should succeed")
            }
        };

        let extractor = Arc::new(extractor);
        let fetcher = Arc::new(MemoryFetcher::new());
        let manager = DownloadQueueManager::open(
            extractor.clone(),
            fetcher.clone(),
            store.clone(),
            library.clone(),
            config,
        )
        .await
        .expect("queue should open");

        Self {
            manager,
            library,
            store,
            extractor,
            fetcher,
            title,
            dir,
        }
    }

    pub fn chapter(&self, index: usize) -> Chapter {
        self.title.chapters[index].clone()
    }

    /// Reloads the chapter record from the library.
    pub async fn stored_chapter(&self, index: usize) -> Chapter {
        let id = self.title.chapters[index].id;
        self.library
            .find_chapter(id)
            .await
            .expect("library should load")
            .expect("chapter should exist")
            .1
    }
}

/// Polls the manager until `condition` holds or five seconds pass.
pub async fn wait_for<F>(manager: &DownloadQueueManager, what: &str, mut condition: F) -> QueueSnapshot
where
    F: FnMut(&QueueSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = manager.snapshot().await;
        if condition(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}: {snapshot:#?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Waits up to five seconds for an event matching `matches`.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<LibraryEvent>, matches: F)
where
    F: Fn(&LibraryEvent) -> bool,
{
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;
    assert!(found.is_ok(), "timed out waiting for event");
}

/// Invariants that must hold in every observable state.
pub fn assert_invariants(snapshot: &QueueSnapshot) {
    use chapterdl_core::TaskStatus;

    let mut seen = HashSet::new();
    for task in snapshot
        .queue
        .iter()
        .chain(&snapshot.completed)
        .chain(&snapshot.failed)
    {
        assert!(
            seen.insert(task.chapter_id()),
            "chapter {} appears twice",
            task.chapter_id()
        );
        assert!((0.0..=1.0).contains(&task.progress));
    }
    let downloading = snapshot
        .queue
        .iter()
        .filter(|task| task.status == TaskStatus::Downloading)
        .count();
    assert!(downloading <= 1, "{downloading} tasks downloading at once");
    assert!(
        snapshot
            .queue
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Downloading))
    );
    assert!(snapshot.completed.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(snapshot.failed.iter().all(|t| t.status == TaskStatus::Failed));
}
