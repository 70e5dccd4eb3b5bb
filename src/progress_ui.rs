//! Progress bar for `chapterdl run`.

use std::time::Duration;

use chapterdl_core::{DownloadQueueManager, DownloadTask};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Spawns a bar that follows the manager's active task.
///
/// Returns the task handle and a stop switch; send `true` and await the
/// handle to clear the bar.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    manager: DownloadQueueManager,
) -> (Option<JoinHandle<()>>, watch::Sender<bool>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    if !enabled {
        return (None, stop_tx);
    }
    (Some(tokio::spawn(follow_active_task(manager, stop_rx))), stop_tx)
}

async fn follow_active_task(manager: DownloadQueueManager, mut stop: watch::Receiver<bool>) {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg:30!} [{bar:30}] {pos:>3}% {prefix}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    while !*stop.borrow() {
        match manager.active_task().await {
            Some(task) => render(&bar, &task),
            None => {
                let pending = manager.snapshot().await.queue.len();
                bar.set_message(format!("waiting ({pending} queued)"));
                bar.set_prefix("");
            }
        }
        tokio::select! {
            _ = stop.changed() => {}
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    bar.finish_and_clear();
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn render(bar: &ProgressBar, task: &DownloadTask) {
    bar.set_message(task.chapter.label());
    bar.set_position((task.progress.clamp(0.0, 1.0) * 100.0).round() as u64);
    bar.set_prefix(
        task.estimated_time_remaining
            .map(|eta| format!("eta {}", format_eta(eta)))
            .unwrap_or_default(),
    );
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}
