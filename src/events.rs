//! Change notifications for front ends.
//!
//! Events are fire-and-forget: publishing with no subscribers is fine and a
//! subscriber that falls behind loses the oldest events.

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Buffered events per subscriber before lagging ones are dropped.
const EVENT_CAPACITY: usize = 256;

/// A change in the library or the download queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A title record (or one of its chapters) was written.
    TitleUpdated {
        /// The title that changed.
        title_id: Uuid,
    },
    /// A chapter finished downloading.
    DownloadCompleted {
        /// Owning title, when known.
        title_id: Option<Uuid>,
        /// The downloaded chapter.
        chapter_id: Uuid,
    },
    /// A chapter was marked read or unread.
    ChapterReadStatusChanged {
        /// Owning title.
        title_id: Uuid,
        /// The chapter.
        chapter_id: Uuid,
        /// New read flag.
        is_read: bool,
    },
    /// Queue, completed or failed lists changed.
    QueueChanged,
    /// The queue was paused.
    Paused,
    /// The queue was resumed.
    Resumed,
}

/// Broadcast hub for [`LibraryEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LibraryEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event to current subscribers.
    pub fn publish(&self, event: LibraryEvent) {
        trace!(?event, "publishing library event");
        // No receivers is not an error for notifications
        let _ = self.sender.send(event);
    }
}
