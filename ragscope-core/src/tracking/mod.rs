//! Experiment tracking.
//!
//! Every query is recorded as one run: parameters, tags, metrics and text
//! artifacts, finished with a terminal [`RunStatus`]. Runs go to an MLflow
//! tracking server when one is configured and to local JSON files otherwise.

pub mod file;
pub mod memory;
pub mod mlflow;

pub use file::FileRecorder;
pub use memory::MemoryRecorder;
pub use mlflow::MlflowRecorder;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::TrackingError;

/// Configuration for experiment tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// `http(s)://` URI of an MLflow server, `memory`, or a directory path.
    /// When unset, runs are written under `local_dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_uri: Option<String>,
    /// Experiment that runs are grouped under.
    pub experiment_name: String,
    /// Directory for locally recorded runs.
    pub local_dir: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: None,
            experiment_name: "rag-evaluation".into(),
            local_dir: PathBuf::from(".ragscope/runs"),
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for experiment runs.
#[async_trait]
pub trait ExperimentRecorder: Send + Sync {
    /// Start a run and return its id.
    async fn open_run(&self, run_name: &str) -> Result<String, TrackingError>;

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError>;

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError>;

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError>;

    /// Attach a text file named `name` to the run.
    async fn log_text_artifact(
        &self,
        run_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), TrackingError>;

    /// Mark the run terminal. A run can be closed only once.
    async fn close_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError>;

    fn backend_name(&self) -> &str;
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub experiment_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Latest value per metric key. A query logs each key once, so the
    /// local recorders keep a single value instead of a step series.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

/// In-process bookkeeping shared by the memory and file recorders.
#[derive(Default)]
pub(crate) struct RunLedger {
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    runs: HashMap<String, RunRecord>,
    order: Vec<String>,
    close_calls: HashMap<String, usize>,
}

impl RunLedger {
    pub(crate) fn open(&self, experiment_name: &str, run_name: &str) -> String {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            experiment_name: experiment_name.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            tags: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        };
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.runs.insert(run_id.clone(), record);
        state.order.push(run_id.clone());
        run_id
    }

    /// Apply `f` to a run that is still open.
    pub(crate) fn update<F>(&self, run_id: &str, f: F) -> Result<(), TrackingError>
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let record = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| TrackingError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if record.status.is_terminal() {
            return Err(TrackingError::RunClosed {
                run_id: run_id.to_string(),
            });
        }
        f(record);
        Ok(())
    }

    /// Close a run and return its final record.
    pub(crate) fn close(&self, run_id: &str, status: RunStatus) -> Result<RunRecord, TrackingError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *state.close_calls.entry(run_id.to_string()).or_insert(0) += 1;
        let record = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| TrackingError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if record.status.is_terminal() {
            return Err(TrackingError::RunClosed {
                run_id: run_id.to_string(),
            });
        }
        record.status = status;
        record.end_time = Some(Utc::now());
        Ok(record.clone())
    }

    pub(crate) fn get(&self, run_id: &str) -> Option<RunRecord> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.runs.get(run_id).cloned()
    }

    pub(crate) fn all(&self) -> Vec<RunRecord> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .order
            .iter()
            .filter_map(|id| state.runs.get(id).cloned())
            .collect()
    }

    pub(crate) fn close_calls(&self, run_id: &str) -> usize {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.close_calls.get(run_id).copied().unwrap_or(0)
    }

    /// Forget a run entirely, close-call count included.
    pub(crate) fn evict(&self, run_id: &str) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.runs.remove(run_id);
        state.order.retain(|id| id != run_id);
        state.close_calls.remove(run_id);
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.runs.is_empty() && state.order.is_empty() && state.close_calls.is_empty()
    }
}

/// Build the configured recorder.
pub fn create_recorder(config: &TrackingConfig) -> Result<Arc<dyn ExperimentRecorder>, TrackingError> {
    match config.tracking_uri.as_deref().map(str::trim) {
        Some(uri) if uri.starts_with("http://") || uri.starts_with("https://") => Ok(Arc::new(
            MlflowRecorder::new(uri, &config.experiment_name)?,
        )),
        Some("memory") => Ok(Arc::new(MemoryRecorder::new(&config.experiment_name))),
        Some(path) if !path.is_empty() => Ok(Arc::new(FileRecorder::new(
            path.trim_start_matches("file://"),
            &config.experiment_name,
        ))),
        _ => Ok(Arc::new(FileRecorder::new(
            &config.local_dir,
            &config.experiment_name,
        ))),
    }
}
