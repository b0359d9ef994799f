//! Recorder that writes each closed run to `<dir>/<experiment>/<run_id>.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ExperimentRecorder, RunLedger, RunRecord, RunStatus};
use crate::error::TrackingError;
use crate::persistence::{atomic_write_json, load_json};

pub struct FileRecorder {
    experiment_name: String,
    experiment_dir: PathBuf,
    ledger: RunLedger,
}

impl FileRecorder {
    pub fn new(dir: impl AsRef<Path>, experiment_name: &str) -> Self {
        Self {
            experiment_name: experiment_name.to_string(),
            experiment_dir: dir.as_ref().join(experiment_name),
            ledger: RunLedger::default(),
        }
    }

    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.experiment_dir.join(format!("{run_id}.json"))
    }

    /// Load a previously closed run from disk.
    pub fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, TrackingError> {
        Ok(load_json(&self.run_path(run_id))?)
    }
}

#[async_trait]
impl ExperimentRecorder for FileRecorder {
    async fn open_run(&self, run_name: &str) -> Result<String, TrackingError> {
        tokio::fs::create_dir_all(&self.experiment_dir).await?;
        Ok(self.ledger.open(&self.experiment_name, run_name))
    }

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.ledger.update(run_id, |r| {
            r.tags.insert(key.to_string(), value.to_string());
        })
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.ledger.update(run_id, |r| {
            r.params.insert(key.to_string(), value.to_string());
        })
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        self.ledger.update(run_id, |r| {
            r.metrics.insert(key.to_string(), value);
        })
    }

    async fn log_text_artifact(
        &self,
        run_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), TrackingError> {
        self.ledger.update(run_id, |r| {
            r.artifacts.insert(name.to_string(), content.to_string());
        })
    }

    async fn close_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError> {
        let record = self.ledger.close(run_id, status)?;
        let path = self.run_path(run_id);
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || atomic_write_json(&target, &record)).await;
        // Evict even when the write failed.
        self.ledger.evict(run_id);
        written
            .map_err(|e| TrackingError::Task {
                message: e.to_string(),
            })??;
        debug!(run_id, path = %path.display(), status = %status, "Run persisted");
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}
