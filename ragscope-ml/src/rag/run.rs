//! Run lifecycle guard.
//!
//! [`ActiveRun`] owns an open experiment run. It is closed explicitly with a
//! terminal status; if the guard is dropped first (the request future was
//! cancelled, or a panic unwound through it) the run is closed as `KILLED`
//! on the current runtime.

use ragscope_core::error::RagError;
use ragscope_core::tracking::{ExperimentRecorder, RunStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default run name: the local start time, `%d-%m-%Y--%H-%M-%S`.
pub fn default_run_name() -> String {
    chrono::Local::now().format("%d-%m-%Y--%H-%M-%S").to_string()
}

pub struct ActiveRun {
    recorder: Arc<dyn ExperimentRecorder>,
    run_id: String,
    closed: bool,
}

impl ActiveRun {
    /// Open a run. Failure here means there is nowhere to record the query.
    pub async fn open(
        recorder: Arc<dyn ExperimentRecorder>,
        run_name: &str,
    ) -> Result<Self, RagError> {
        let run_id = recorder.open_run(run_name).await?;
        debug!(run_id = %run_id, run_name, backend = recorder.backend_name(), "Run opened");
        Ok(Self {
            recorder,
            run_id,
            closed: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn tag(&self, key: &str, value: &str) {
        if let Err(e) = self.recorder.set_tag(&self.run_id, key, value).await {
            warn!(run_id = %self.run_id, key, error = %e, "Failed to set run tag");
        }
    }

    pub async fn param(&self, key: &str, value: &str) {
        if let Err(e) = self.recorder.log_param(&self.run_id, key, value).await {
            warn!(run_id = %self.run_id, key, error = %e, "Failed to log run param");
        }
    }

    pub async fn metric(&self, key: &str, value: f64) {
        if let Err(e) = self.recorder.log_metric(&self.run_id, key, value).await {
            warn!(run_id = %self.run_id, key, error = %e, "Failed to log run metric");
        }
    }

    pub async fn artifact(&self, name: &str, content: &str) {
        if let Err(e) = self
            .recorder
            .log_text_artifact(&self.run_id, name, content)
            .await
        {
            warn!(run_id = %self.run_id, name, error = %e, "Failed to log run artifact");
        }
    }

    /// Close the run with `status`. Consumes the guard.
    pub async fn close(mut self, status: RunStatus) {
        self.closed = true;
        match self.recorder.close_run(&self.run_id, status).await {
            Ok(()) => debug!(run_id = %self.run_id, status = %status, "Run closed"),
            Err(e) => warn!(run_id = %self.run_id, status = %status, error = %e, "Failed to close run"),
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let recorder = self.recorder.clone();
        let run_id = std::mem::take(&mut self.run_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match recorder.close_run(&run_id, RunStatus::Killed).await {
                        Ok(()) => warn!(run_id = %run_id, "Run abandoned before completion; closed as KILLED"),
                        Err(e) => warn!(run_id = %run_id, error = %e, "Failed to close abandoned run"),
                    }
                });
            }
            Err(_) => warn!(run_id = %run_id, "Run abandoned outside a runtime; left open"),
        }
    }
}
