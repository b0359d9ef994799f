//! MLflow tracking server client (REST API 2.0).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ExperimentRecorder, RunStatus};
use crate::error::TrackingError;

/// Longest parameter value MLflow accepts.
const MAX_PARAM_CHARS: usize = 500;

pub struct MlflowRecorder {
    client: Client,
    base_url: String,
    experiment_name: String,
    experiment_id: OnceCell<String>,
}

impl MlflowRecorder {
    pub fn new(tracking_uri: &str, experiment_name: &str) -> Result<Self, TrackingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TrackingError::Request {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: tracking_uri.trim_end_matches('/').to_string(),
            experiment_name: experiment_name.to_string(),
            experiment_id: OnceCell::new(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base_url)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TrackingError> {
        let url = self.api_url(path);
        debug!(url = %url, "MLflow request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    /// Resolve the experiment id by name, creating the experiment if needed.
    async fn experiment_id(&self) -> Result<&str, TrackingError> {
        self.experiment_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(self.api_url("experiments/get-by-name"))
                    .query(&[("experiment_name", self.experiment_name.as_str())])
                    .send()
                    .await
                    .map_err(request_error)?;

                if response.status().as_u16() == 404 {
                    info!(experiment = %self.experiment_name, "Creating MLflow experiment");
                    let created = self
                        .post("experiments/create", json!({ "name": self.experiment_name }))
                        .await?;
                    return string_field(&created["experiment_id"], "experiment_id");
                }
                let found = read_json(response).await?;
                string_field(&found["experiment"]["experiment_id"], "experiment_id")
            })
            .await
            .map(String::as_str)
    }
}

fn request_error(err: reqwest::Error) -> TrackingError {
    TrackingError::Request {
        message: err.to_string(),
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, TrackingError> {
    let status = response.status();
    let body = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        return Err(TrackingError::Server {
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(&body)?)
}

fn string_field(value: &Value, name: &str) -> Result<String, TrackingError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TrackingError::Request {
            message: format!("MLflow response has no '{name}'"),
        })
}

fn truncate_param(value: &str) -> String {
    value.chars().take(MAX_PARAM_CHARS).collect()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl ExperimentRecorder for MlflowRecorder {
    async fn open_run(&self, run_name: &str) -> Result<String, TrackingError> {
        let experiment_id = self.experiment_id().await?.to_string();
        let created = self
            .post(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "run_name": run_name,
                    "start_time": now_millis(),
                    "tags": [{ "key": "mlflow.runName", "value": run_name }],
                }),
            )
            .await?;
        string_field(&created["run"]["info"]["run_id"], "run_id")
    }

    async fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.post(
            "runs/set-tag",
            json!({ "run_id": run_id, "key": key, "value": value }),
        )
        .await
        .map(|_| ())
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.post(
            "runs/log-parameter",
            json!({ "run_id": run_id, "key": key, "value": truncate_param(value) }),
        )
        .await
        .map(|_| ())
    }

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<(), TrackingError> {
        self.post(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": now_millis(),
                "step": 0,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn log_text_artifact(
        &self,
        run_id: &str,
        name: &str,
        content: &str,
    ) -> Result<(), TrackingError> {
        let experiment_id = self.experiment_id().await?;
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{experiment_id}/{run_id}/artifacts/{name}",
            self.base_url
        );
        let response = self
            .client
            .put(&url)
            .body(content.to_string())
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await.map(|_| ())
    }

    async fn close_run(&self, run_id: &str, status: RunStatus) -> Result<(), TrackingError> {
        self.post(
            "runs/update",
            json!({
                "run_id": run_id,
                "status": status.as_str(),
                "end_time": now_millis(),
            }),
        )
        .await
        .map(|_| ())
    }

    fn backend_name(&self) -> &str {
        "mlflow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let recorder = MlflowRecorder::new("http://mlflow:5000/", "rag-evaluation").unwrap();
        assert_eq!(
            recorder.api_url("runs/create"),
            "http://mlflow:5000/api/2.0/mlflow/runs/create"
        );
    }

    #[test]
    fn test_truncate_param() {
        let long = "é".repeat(600);
        assert_eq!(truncate_param(&long).chars().count(), MAX_PARAM_CHARS);
        assert_eq!(truncate_param("short"), "short");
    }

    #[test]
    fn test_string_field() {
        let v = json!({"run": {"info": {"run_id": "abc123"}}});
        assert_eq!(string_field(&v["run"]["info"]["run_id"], "run_id").unwrap(), "abc123");
        assert!(string_field(&v["missing"], "run_id").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_open() {
        let recorder = MlflowRecorder::new("http://127.0.0.1:1", "rag-evaluation").unwrap();
        let err = recorder.open_run("run").await.unwrap_err();
        assert!(matches!(err, TrackingError::Request { .. }));
    }
}
