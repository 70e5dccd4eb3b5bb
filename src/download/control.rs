//! Cooperative run control.
//!
//! Each pipeline run gets a watch channel. The manager keeps the
//! [`RunHandle`]; the pipeline holds a [`RunControl`] and checks it at every
//! suspension point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::error::PipelineError;

/// State of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunSignal {
    Running,
    Paused,
    Cancelled,
}

impl RunSignal {
    fn interruption(self) -> Option<PipelineError> {
        match self {
            Self::Running => None,
            Self::Paused => Some(PipelineError::Paused),
            Self::Cancelled => Some(PipelineError::Cancelled),
        }
    }
}

/// Manager side of a run's control channel.
#[derive(Debug, Clone)]
pub(crate) struct RunHandle {
    control: Arc<watch::Sender<RunSignal>>,
}

impl RunHandle {
    pub(crate) fn pause(&self) {
        self.control.send_replace(RunSignal::Paused);
    }

    pub(crate) fn cancel(&self) {
        self.control.send_replace(RunSignal::Cancelled);
    }
}

/// Pipeline side of a run's control channel.
#[derive(Debug, Clone)]
pub(crate) struct RunControl {
    rx: watch::Receiver<RunSignal>,
}

impl RunControl {
    /// Fails fast when the run was paused or cancelled.
    pub(crate) fn check(&self) -> Result<(), PipelineError> {
        match self.rx.borrow().interruption() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the run stops being `Running`. A dropped handle counts as cancel.
    pub(crate) async fn interrupted(&self) -> PipelineError {
        let mut rx = self.rx.clone();
        let signal = rx
            .wait_for(|signal| *signal != RunSignal::Running)
            .await
            .map(|signal| *signal);
        match signal {
            Ok(signal) => signal.interruption().unwrap_or(PipelineError::Cancelled),
            Err(_) => PipelineError::Cancelled,
        }
    }

    /// Sleeps for `duration` unless interrupted first.
    pub(crate) async fn sleep(&self, duration: Duration) -> Result<(), PipelineError> {
        self.race(tokio::time::sleep(duration)).await
    }

    /// Runs `operation` unless the run is interrupted first.
    pub(crate) async fn race<F: Future>(&self, operation: F) -> Result<F::Output, PipelineError> {
        self.check()?;
        tokio::select! {
            output = operation => Ok(output),
            err = self.interrupted() => Err(err),
        }
    }
}

/// Creates the control channel for a new run.
pub(crate) fn run_control() -> (RunHandle, RunControl) {
    let (tx, rx) = watch::channel(RunSignal::Running);
    (
        RunHandle {
            control: Arc::new(tx),
        },
        RunControl { rx },
    )
}
