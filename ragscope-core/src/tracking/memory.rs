//! Recorder that keeps runs in memory, for tests and throwaway sessions.

use async_trait::async_trait;

use super::{ExperimentRecorder, RunLedger, RunRecord, RunStatus};
use crate::error::TrackingError;

pub struct MemoryRecorder {
    experiment_name: String,
    ledger: RunLedger,
    reject_open: bool,
    reject_writes: bool,
}

impl MemoryRecorder {
    pub fn new(experiment_name: &str) -> Self {
        Self {
            experiment_name: experiment_name.to_string(),
            ledger: RunLedger::default(),
            reject_open: false,
            reject_writes: false,
        }
    }

    /// A recorder whose tracking server is down: every `open_run` fails.
    pub fn unreachable(experiment_name: &str) -> Self {
        Self {
            reject_open: true,
            ..Self::new(experiment_name)
        }
    }

    /// A recorder that opens and closes runs but rejects tags, params,
    /// metrics and artifacts.
    pub fn rejecting_writes(experiment_name: &str) -> Self {
        Self {
            reject_writes: true,
            ..Self::new(experiment_name)
        }
    }

    /// Every run opened so far, in open order.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.ledger.all()
    }

    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.ledger.get(run_id)
    }

    /// Number of `close_run` calls made for `run_id`, including rejected ones.
    pub fn close_calls(&self, run_id: &str) -> usize {
        self.ledger.close_calls(run_id)
    }

    fn check_writable(&self) -> Result<(), TrackingError> {
        if self.reject_writes {
            return Err(TrackingError::Request {
                message: "tracking store rejected the write".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExperimentRecorder for MemoryRecorder {
    async fn open_run(&self, run_name: &str) -> Result<String, TrackingError> {
        if self.reject_open {
            return Err(TrackingError::Request {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.ledger.open(&self.experiment_name, run_name))
    }

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.check_writable()?;
        self.ledger.update(run_id, |r| {
            r.tags.insert(key.to_string(), value.to_string());
        })
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.check_writable()?;
        self.ledger.update(run_id, |r| {
            r.params.insert(key.to_string(), value.to_string());
        })
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        self.check_writable()?;
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
        self.check_writable()?;
        self.ledger.update(run_id, |r| {
            r.artifacts.insert(name.to_string(), content.to_string());
        })
    }

    async fn close_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError> {
        self.ledger.close(run_id, status).map(|_| ())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
