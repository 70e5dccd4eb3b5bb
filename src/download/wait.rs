//! Bounded wait for a page to yield its content items.
//!
//! Reader pages often insert images late. Attempt `n` waits `n` units and
//! then asks the session again; a good enough result ends the wait early, but
//! only once the page has had a few attempts to settle.

use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use super::control::RunControl;
use super::error::PipelineError;
use super::progress::{ProgressReporter, extraction_progress};
use crate::config::QueueConfig;
use crate::extract::{ContentItem, ExtractionSession};

#[derive(Debug, Clone)]
pub(crate) struct ExtractionWaitPolicy {
    attempts: u32,
    unit: Duration,
    min_items: usize,
    early_exit_after: u32,
}

impl ExtractionWaitPolicy {
    pub(crate) fn from_config(config: &QueueConfig) -> Self {
        Self {
            attempts: config.wait_attempts.max(1),
            unit: config.wait_unit,
            min_items: config.min_items,
            early_exit_after: config.early_exit_after_attempt,
        }
    }

    /// Returns the largest item list seen across the attempts.
    ///
    /// Per-attempt extractor errors count as "nothing found". Only pause or
    /// cancel ends the wait with an error.
    pub(crate) async fn wait_for_content(
        &self,
        session: &dyn ExtractionSession,
        url: &Url,
        control: &RunControl,
        progress: &ProgressReporter,
    ) -> Result<Vec<ContentItem>, PipelineError> {
        let mut best: Vec<ContentItem> = Vec::new();

        for attempt in 1..=self.attempts {
            progress.report(extraction_progress(attempt - 1, self.attempts));
            control.sleep(self.unit * attempt).await?;

            match control.race(session.load(url)).await? {
                Ok(Some(items)) => {
                    let found = items.len();
                    debug!(attempt, found, "extraction attempt");
                    if found > best.len() {
                        best = items;
                    }
                    if attempt > self.early_exit_after && found >= self.min_items {
                        debug!(attempt, found, "content settled");
                        return Ok(best);
                    }
                }
                Ok(None) => debug!(attempt, "extraction found nothing"),
                Err(error) => warn!(attempt, error = %error, "extraction attempt failed"),
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::download::control::run_control;
    use crate::extract::ExtractError;

    /// Returns the scripted result for each call; the last entry repeats.
    struct ScriptedSession {
        script: Mutex<Vec<Result<Option<usize>, ()>>>,
        calls: AtomicU32,
    }

    impl ScriptedSession {
        fn new(script: Vec<Result<Option<usize>, ()>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionSession for ScriptedSession {
        async fn load(&self, url: &Url) -> Result<Option<Vec<ContentItem>>, ExtractError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let step = {
                let script = self.script.lock().unwrap();
                script[index.min(script.len() - 1)]
            };
            match step {
                Ok(Some(count)) => Ok(Some(
                    (0..count)
                        .map(|i| ContentItem::new(format!("https://cdn.example.com/{i}.jpg"), 10, 10, i as f64))
                        .collect(),
                )),
                Ok(None) => Ok(None),
                Err(()) => Err(ExtractError::load(url.as_str(), "script error")),
            }
        }

        async fn stop(&self) {}
    }

    fn policy() -> ExtractionWaitPolicy {
        ExtractionWaitPolicy::from_config(&QueueConfig {
            wait_unit: Duration::from_millis(1),
            ..QueueConfig::default()
        })
    }

    fn reporter() -> (ProgressReporter, mpsc::UnboundedReceiver<f64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressReporter::new(tx), rx)
    }

    fn url() -> Url {
        Url::parse("https://reader.example.com/ch/1").unwrap()
    }

    #[tokio::test]
    async fn test_does_not_exit_before_fourth_attempt() {
        let session = ScriptedSession::new(vec![Ok(Some(12))]);
        let (_handle, control) = run_control();
        let (progress, _rx) = reporter();

        let items = policy()
            .wait_for_content(&session, &url(), &control, &progress)
            .await
            .unwrap();

        assert_eq!(items.len(), 12);
        assert_eq!(session.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_keeps_best_result_and_exhausts_attempts() {
        let session = ScriptedSession::new(vec![
            Ok(Some(3)),
            Ok(Some(7)),
            Err(()),
            Ok(None),
            Ok(Some(5)),
        ]);
        let (_handle, control) = run_control();
        let (progress, mut rx) = reporter();

        let items = policy()
            .wait_for_content(&session, &url(), &control, &progress)
            .await
            .unwrap();

        assert_eq!(items.len(), 7);
        assert_eq!(session.calls.load(Ordering::SeqCst), 5);

        let mut reported = Vec::new();
        while let Ok(p) = rx.try_recv() {
            reported.push(p);
        }
        assert_eq!(reported.len(), 5);
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
        assert!(reported.iter().all(|p| (0.1..0.5).contains(p)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let session = ScriptedSession::new(vec![Ok(Some(1))]);
        let (handle, control) = run_control();
        let (progress, _rx) = reporter();
        handle.cancel();

        let result = policy()
            .wait_for_content(&session, &url(), &control, &progress)
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(session.calls.load(Ordering::SeqCst), 0);
    }
}
