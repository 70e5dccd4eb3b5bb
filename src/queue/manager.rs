//! The download queue manager.
//!
//! One tokio mutex guards the three task lists, the pause flag and the record
//! of the active run. The pipeline itself runs on a separate task and reports
//! back through a progress channel and a final outcome, both tagged with the
//! run id so results from a run that was cancelled or paused are ignored.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, broadcast, mpsc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::QueueError;
use super::snapshot::QueueSnapshot;
use super::task::{DownloadTask, TaskStatus};
use crate::config::QueueConfig;
use crate::download::control::{RunControl, RunHandle, run_control};
use crate::download::pipeline::{ChapterDownload, ChapterPipeline, SessionSlot};
use crate::download::progress::{PROGRESS_FLOOR, ProgressReporter};
use crate::download::{ContentFetcher, PipelineError, estimate_remaining};
use crate::events::{EventBus, LibraryEvent};
use crate::extract::PageExtractor;
use crate::library::{Chapter, Library};
use crate::store::{PersistentStore, StoreError};

/// Serializes chapter downloads through a single pipeline.
///
/// Cloning is cheap and shares the same queue. The manager accepts mutations
/// right after [`open`](Self::open) but only starts downloading once
/// [`start`](Self::start) was called.
#[derive(Clone)]
pub struct DownloadQueueManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for DownloadQueueManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadQueueManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct Inner {
    state: Mutex<QueueState>,
    pipeline: ChapterPipeline,
    store: Arc<dyn PersistentStore>,
    library: Library,
    events: EventBus,
    config: QueueConfig,
    changed: Notify,
    next_run_id: AtomicU64,
}

struct ActiveRun {
    run_id: u64,
    chapter_id: Uuid,
    handle: RunHandle,
    session: SessionSlot,
    started_at: Instant,
}

#[derive(Default)]
struct QueueState {
    queue: Vec<DownloadTask>,
    completed: Vec<DownloadTask>,
    failed: Vec<DownloadTask>,
    is_paused: bool,
    started: bool,
    active: Option<ActiveRun>,
    /// Session of the last finished run, torn down before the next one starts.
    stale_session: Option<SessionSlot>,
}

impl QueueState {
    fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        Self {
            queue: snapshot.queue,
            completed: snapshot.completed,
            failed: snapshot.failed,
            ..Self::default()
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue: self.queue.clone(),
            completed: self.completed.clone(),
            failed: self.failed.clone(),
        }
    }

    fn is_downloading(&self) -> bool {
        self.active.is_some()
    }

    fn contains(&self, chapter_id: Uuid) -> bool {
        self.queue
            .iter()
            .chain(&self.completed)
            .chain(&self.failed)
            .any(|task| task.chapter_id() == chapter_id)
    }

    fn can_start(&self) -> bool {
        self.started
            && !self.is_downloading()
            && !self.is_paused
            && self.queue.iter().any(|task| task.status == TaskStatus::Queued)
    }

    fn is_active(&self, run_id: u64) -> bool {
        self.active.as_ref().is_some_and(|run| run.run_id == run_id)
    }

    fn take_queued(&mut self, chapter_id: Uuid) -> Option<DownloadTask> {
        let index = self
            .queue
            .iter()
            .position(|task| task.chapter_id() == chapter_id)?;
        Some(self.queue.remove(index))
    }

    /// Stops the active run with `interrupt` and returns its session slot.
    fn detach_active(&mut self, interrupt: fn(&RunHandle)) -> Option<(Uuid, SessionSlot)> {
        let run = self.active.take()?;
        interrupt(&run.handle);
        Some((run.chapter_id, run.session))
    }
}

fn transition(task: &mut DownloadTask, next: TaskStatus) {
    if !task.status.can_transition_to(next) {
        debug!(
            chapter_id = %task.chapter_id(),
            from = %task.status,
            to = %next,
            "unexpected task transition"
        );
    }
    task.status = next;
}

async fn stop_session(slot: &SessionSlot) {
    if let Some(session) = slot.take() {
        session.stop().await;
    }
}

impl DownloadQueueManager {
    /// Loads saved state and builds the manager.
    ///
    /// A missing state file starts empty. A corrupt one is logged and
    /// replaced by an empty state. Tasks interrupted mid-download are
    /// re-queued.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Config`] for an invalid `config` and
    /// [`QueueError::Store`] when the state file exists but cannot be read.
    #[instrument(skip_all)]
    pub async fn open(
        extractor: Arc<dyn PageExtractor>,
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn PersistentStore>,
        library: Library,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        config.validate()?;

        let (snapshot, repaired) = match store.load_state().await {
            Ok(Some(mut snapshot)) => {
                let repaired = snapshot.recover();
                (snapshot, repaired)
            }
            Ok(None) => (QueueSnapshot::default(), 0),
            Err(error @ StoreError::Corrupt { .. }) => {
                warn!(error = %error, "discarding unreadable download state");
                (QueueSnapshot::default(), 1)
            }
            Err(error) => return Err(error.into()),
        };
        if repaired > 0 {
            info!(repaired, "recovered download state from previous run");
            if let Err(error) = store.save_state(&snapshot).await {
                warn!(error = %error, "failed to save recovered download state");
            }
        }
        debug!(
            queued = snapshot.queue.len(),
            completed = snapshot.completed.len(),
            failed = snapshot.failed.len(),
            "download state loaded"
        );

        let pipeline = ChapterPipeline::new(extractor, fetcher, Arc::clone(&store), config.clone());
        let events = library.events().clone();
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::from_snapshot(snapshot)),
                pipeline,
                store,
                library,
                events,
                config,
                changed: Notify::new(),
                next_run_id: AtomicU64::new(1),
            }),
        })
    }

    /// Enables the scheduler and starts the first queued task.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        if state.started {
            return;
        }
        state.started = true;
        drop(state);
        debug!("scheduler started");
        trigger_scheduler(&self.inner);
    }

    /// Appends a queued task for `chapter`.
    ///
    /// Returns false when the chapter already has a task in any list.
    #[instrument(skip(self, chapter), fields(chapter_id = %chapter.id))]
    pub async fn enqueue(&self, chapter: Chapter) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.contains(chapter.id) {
            debug!("chapter already has a task");
            return false;
        }
        let was_empty = state.queue.is_empty();
        state.queue.push(DownloadTask::new(chapter));
        self.inner.commit(&state).await;

        let should_trigger = was_empty && !state.is_downloading() && !state.is_paused;
        drop(state);
        if should_trigger {
            trigger_scheduler(&self.inner);
        }
        true
    }

    /// Appends every eligible chapter in ascending chapter-number order.
    ///
    /// Chapters whose URL is in `excluded_urls`, that are already downloaded
    /// or that already have a task are skipped. Returns the number added.
    #[instrument(skip_all, fields(offered = chapters.len()))]
    pub async fn enqueue_all(&self, chapters: Vec<Chapter>, excluded_urls: &BTreeSet<String>) -> usize {
        let mut state = self.inner.state.lock().await;
        let mut seen = HashSet::new();
        let mut eligible: Vec<Chapter> = chapters
            .into_iter()
            .filter(|chapter| {
                !excluded_urls.contains(&chapter.url)
                    && !chapter.is_downloaded
                    && !state.contains(chapter.id)
                    && seen.insert(chapter.id)
            })
            .collect();
        if eligible.is_empty() {
            return 0;
        }
        eligible.sort_by(|a, b| a.chapter_number.total_cmp(&b.chapter_number));

        let was_empty = state.queue.is_empty();
        let added = eligible.len();
        state
            .queue
            .extend(eligible.into_iter().map(DownloadTask::new));
        self.inner.commit(&state).await;
        info!(added, "chapters enqueued");

        let should_trigger = was_empty && !state.is_downloading() && !state.is_paused;
        drop(state);
        if should_trigger {
            trigger_scheduler(&self.inner);
        }
        added
    }

    /// Cancels the chapter's queued or active task.
    ///
    /// Returns false when the chapter has no pending task. In both cases the
    /// chapter is marked as not downloaded in the library.
    #[instrument(skip(self))]
    pub async fn cancel(&self, chapter_id: Uuid) -> bool {
        let mut state = self.inner.state.lock().await;
        let active_session = if state
            .active
            .as_ref()
            .is_some_and(|run| run.chapter_id == chapter_id)
        {
            state.detach_active(RunHandle::cancel).map(|(_, slot)| slot)
        } else {
            None
        };
        let was_active = active_session.is_some();

        if state.take_queued(chapter_id).is_none() && !was_active {
            return false;
        }
        self.inner.commit(&state).await;
        drop(state);

        if let Some(slot) = active_session {
            stop_session(&slot).await;
            info!("active download cancelled");
        } else {
            debug!("queued download cancelled");
        }
        self.inner.reset_downloaded(&[chapter_id]).await;

        if was_active {
            trigger_scheduler(&self.inner);
        }
        true
    }

    /// Moves a failed task back to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFailed`] for a task that is queued or
    /// completed and [`QueueError::TaskNotFound`] when there is no task.
    #[instrument(skip(self))]
    pub async fn retry(&self, chapter_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock().await;
        let Some(index) = state
            .failed
            .iter()
            .position(|task| task.chapter_id() == chapter_id)
        else {
            return Err(if state.contains(chapter_id) {
                QueueError::NotFailed(chapter_id)
            } else {
                QueueError::TaskNotFound(chapter_id)
            });
        };

        let mut task = state.failed.remove(index);
        transition(&mut task, TaskStatus::Queued);
        task.requeue(0.0);
        state.queue.push(task);
        self.inner.commit(&state).await;

        let should_trigger = !state.is_downloading() && !state.is_paused;
        drop(state);
        if should_trigger {
            trigger_scheduler(&self.inner);
        }
        Ok(())
    }

    /// Pauses the queue. The active task goes back to the queue head.
    #[instrument(skip(self))]
    pub async fn pause(&self) {
        let mut state = self.inner.state.lock().await;
        if state.is_paused {
            return;
        }
        state.is_paused = true;

        let interrupted = state.detach_active(RunHandle::pause);
        if let Some((chapter_id, _)) = &interrupted {
            let paused_progress = self.inner.config.paused_progress;
            if let Some(task) = state
                .queue
                .iter_mut()
                .find(|task| task.chapter_id() == *chapter_id)
            {
                transition(task, TaskStatus::Queued);
                task.requeue(paused_progress);
            }
        }
        self.inner.commit(&state).await;
        drop(state);

        if let Some((_, slot)) = interrupted {
            stop_session(&slot).await;
        }
        info!("download queue paused");
        self.inner.events.publish(LibraryEvent::Paused);
    }

    /// Resumes a paused queue.
    #[instrument(skip(self))]
    pub async fn resume(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.is_paused {
            return;
        }
        state.is_paused = false;
        self.inner.commit(&state).await;
        drop(state);

        info!("download queue resumed");
        self.inner.events.publish(LibraryEvent::Resumed);
        trigger_scheduler(&self.inner);
    }

    /// Empties the completed list.
    pub async fn clear_completed(&self) {
        let mut state = self.inner.state.lock().await;
        state.completed.clear();
        self.inner.commit(&state).await;
    }

    /// Empties the failed list and marks those chapters not downloaded.
    pub async fn clear_failed(&self) {
        let mut state = self.inner.state.lock().await;
        let chapter_ids: Vec<Uuid> = state.failed.drain(..).map(|t| t.chapter_id()).collect();
        self.inner.commit(&state).await;
        drop(state);
        self.inner.reset_downloaded(&chapter_ids).await;
    }

    /// Cancels the active task, empties the queue and clears the pause flag.
    #[instrument(skip(self))]
    pub async fn clear_queue(&self) {
        let mut state = self.inner.state.lock().await;
        let active = state.detach_active(RunHandle::cancel);
        let chapter_ids: Vec<Uuid> = state.queue.drain(..).map(|t| t.chapter_id()).collect();
        state.is_paused = false;
        self.inner.commit(&state).await;
        drop(state);

        if let Some((_, slot)) = active {
            stop_session(&slot).await;
        }
        info!(cleared = chapter_ids.len(), "download queue cleared");
        self.inner.reset_downloaded(&chapter_ids).await;
    }

    /// Copy of the three lists.
    pub async fn snapshot(&self) -> QueueSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    /// True while a task is `Downloading`.
    pub async fn is_downloading(&self) -> bool {
        self.inner.state.lock().await.is_downloading()
    }

    /// True while paused.
    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.is_paused
    }

    /// The `Downloading` task, if any.
    pub async fn active_task(&self) -> Option<DownloadTask> {
        let state = self.inner.state.lock().await;
        state
            .queue
            .iter()
            .find(|task| task.status == TaskStatus::Downloading)
            .cloned()
    }

    /// Subscribes to library and queue events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.inner.events.subscribe()
    }

    /// Waits until nothing is queued or downloading, or the queue is paused.
    ///
    /// Returns immediately when the scheduler was never started.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock().await;
                let pending = !state.queue.is_empty() || state.is_downloading();
                if !state.started || state.is_paused || !pending {
                    return;
                }
            }
            notified.await;
        }
    }
}

impl Inner {
    /// Persists the lists, wakes waiters and announces the change.
    ///
    /// Save failures are logged; memory stays authoritative.
    async fn commit(&self, state: &QueueState) {
        if let Err(error) = self.store.save_state(&state.snapshot()).await {
            warn!(error = %error, "failed to save download state");
        }
        self.changed.notify_waiters();
        self.events.publish(LibraryEvent::QueueChanged);
    }

    async fn reset_downloaded(&self, chapter_ids: &[Uuid]) {
        for &chapter_id in chapter_ids {
            if let Err(error) = self
                .library
                .update_chapter(chapter_id, |chapter| chapter.is_downloaded = false)
                .await
            {
                warn!(%chapter_id, error = %error, "failed to reset chapter download flag");
            }
        }
    }

    async fn apply_progress(&self, run_id: u64, progress: f64) {
        let mut state = self.state.lock().await;
        let Some(run) = state.active.as_ref().filter(|run| run.run_id == run_id) else {
            return;
        };
        let (chapter_id, elapsed) = (run.chapter_id, run.started_at.elapsed());
        if let Some(task) = state
            .queue
            .iter_mut()
            .find(|task| task.chapter_id() == chapter_id && task.status == TaskStatus::Downloading)
        {
            task.progress = progress;
            task.estimated_time_remaining = estimate_remaining(elapsed, progress);
        }
    }

    async fn finish_run(
        self: &Arc<Self>,
        run_id: u64,
        chapter: Chapter,
        outcome: Result<ChapterDownload, PipelineError>,
    ) {
        let mut state = self.state.lock().await;
        if !state.is_active(run_id) {
            debug!(run_id, "ignoring outcome of interrupted run");
            return;
        }
        state.stale_session = state.active.take().map(|run| run.session);

        let chapter_id = chapter.id;
        let mut task = state.take_queued(chapter_id).unwrap_or_else(|| {
            let mut task = DownloadTask::new(chapter.clone());
            task.status = TaskStatus::Downloading;
            task
        });
        task.estimated_time_remaining = None;

        let mut completed = None;
        // Library records are written before the task lists change.
        match outcome {
            Ok(download) => {
                let title_id = match self
                    .library
                    .update_chapter(chapter_id, |c| c.mark_downloaded(download.images, download.bytes))
                    .await
                {
                    Ok(title_id) => title_id,
                    Err(error) => {
                        warn!(%chapter_id, error = %error, "failed to record completed download");
                        None
                    }
                };
                transition(&mut task, TaskStatus::Completed);
                task.progress = 1.0;
                task.error = None;
                state.completed.insert(0, task);
                self.commit(&state).await;

                info!(chapter = %chapter.label(), images = download.images, bytes = download.bytes, "download completed");
                completed = Some(LibraryEvent::DownloadCompleted {
                    title_id,
                    chapter_id,
                });
            }
            Err(error) if error.is_interruption() => {
                debug!(error = %error, "run interrupted without pause bookkeeping");
                transition(&mut task, TaskStatus::Queued);
                task.requeue(self.config.paused_progress);
                state.queue.insert(0, task);
                self.commit(&state).await;
            }
            Err(error) => {
                let message = error.to_string();
                warn!(chapter = %chapter.label(), error = %message, "download failed");
                if let Err(error) = self
                    .library
                    .update_chapter(chapter_id, |c| c.mark_download_failed(message.clone()))
                    .await
                {
                    warn!(%chapter_id, error = %error, "failed to record download failure");
                }
                transition(&mut task, TaskStatus::Failed);
                task.error = Some(message);
                state.failed.push(task);
                self.commit(&state).await;
            }
        }
        drop(state);
        if let Some(event) = completed {
            self.events.publish(event);
        }

        tokio::time::sleep(self.config.cooldown).await;
        trigger_scheduler(self);
    }
}

/// Spawns a scheduler pass. Plain function so the spawned future types do not
/// refer back to themselves.
fn trigger_scheduler(inner: &Arc<Inner>) {
    tokio::spawn(schedule_next(Arc::clone(inner)));
}

async fn schedule_next(inner: Arc<Inner>) {
    let stale = {
        let mut state = inner.state.lock().await;
        if !state.can_start() {
            return;
        }
        state.stale_session.take()
    };
    if let Some(slot) = stale {
        stop_session(&slot).await;
    }

    tokio::time::sleep(inner.config.settle_delay).await;

    let mut state = inner.state.lock().await;
    if !state.can_start() {
        return;
    }
    let Some(task) = state
        .queue
        .iter_mut()
        .find(|task| task.status == TaskStatus::Queued)
    else {
        return;
    };

    transition(task, TaskStatus::Downloading);
    task.start_time = Utc::now();
    task.progress = PROGRESS_FLOOR;
    task.error = None;
    task.estimated_time_remaining = None;
    let chapter = task.chapter.clone();

    let run_id = inner.next_run_id.fetch_add(1, Ordering::Relaxed);
    let (handle, control) = run_control();
    let session = SessionSlot::default();
    state.active = Some(ActiveRun {
        run_id,
        chapter_id: chapter.id,
        handle,
        session: session.clone(),
        started_at: Instant::now(),
    });
    inner.commit(&state).await;
    drop(state);

    info!(chapter = %chapter.label(), run_id, "download started");
    tokio::spawn(drive(inner, run_id, chapter, control, session));
}

async fn drive(inner: Arc<Inner>, run_id: u64, chapter: Chapter, control: RunControl, session: SessionSlot) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let forwarder = {
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                inner.apply_progress(run_id, progress).await;
            }
        })
    };

    let reporter = ProgressReporter::new(tx);
    let outcome = inner
        .pipeline
        .run(&chapter, &control, &reporter, &session)
        .await;
    drop(reporter);

    if let Err(error) = forwarder.await {
        warn!(error = %error, "progress forwarder ended abnormally");
    }
    inner.finish_run(run_id, chapter, outcome).await;
}
