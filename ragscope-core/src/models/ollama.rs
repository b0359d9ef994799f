//! Ollama model service adapter.
//!
//! Talks to the native Ollama HTTP API: `/api/generate` for completions,
//! `/api/tags` for liveness, and `/api/pull` to fetch models at startup.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::{ModelAdapter, with_retry};
use crate::config::{ModelConfig, RetryConfig};
use crate::error::ModelError;

/// A generation or judge model served by Ollama.
pub struct OllamaModel {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    health_timeout: Duration,
    retry: RetryConfig,
}

impl OllamaModel {
    /// Build an adapter for `model` using the shared model-service settings.
    pub fn new(config: &ModelConfig, model: &str) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ModelError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
            retry: config.retry.clone(),
        })
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
            },
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(url = %url, model = %self.model, prompt_chars = prompt.len(), "Sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&self.build_request_body(prompt))
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ModelError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(map_http_error(status, &body, &self.model));
        }

        let json: Value = serde_json::from_str(&body).map_err(|e| ModelError::ResponseParse {
            message: format!("Invalid JSON: {e}"),
        })?;
        parse_generate_response(&json)
    }
}

#[async_trait]
impl ModelAdapter for OllamaModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        with_retry(&self.retry, || self.generate_once(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ping(&self) -> Result<(), ModelError> {
        probe_model_service(&self.base_url, self.health_timeout).await
    }
}

/// Extract the completion text from a non-streaming `/api/generate` reply.
fn parse_generate_response(json: &Value) -> Result<String, ModelError> {
    if let Some(error) = json["error"].as_str() {
        return Err(ModelError::ApiRequest {
            message: error.to_string(),
        });
    }
    json["response"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ModelError::ResponseParse {
            message: "response has no 'response' field".to_string(),
        })
}

/// Map a non-success HTTP status from the model service to a [`ModelError`].
pub(crate) fn map_http_error(status: StatusCode, body_text: &str, model: &str) -> ModelError {
    match status.as_u16() {
        404 => ModelError::ModelNotFound {
            model: model.to_string(),
        },
        502..=504 => ModelError::Connection {
            message: format!("HTTP {status} from model service: {body_text}"),
        },
        _ => ModelError::ApiRequest {
            message: format!("HTTP {status} from model service: {body_text}"),
        },
    }
}

/// Map a transport-level `reqwest` failure to a [`ModelError`].
pub(crate) fn map_send_error(err: reqwest::Error, timeout_secs: u64) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout { timeout_secs }
    } else if err.is_connect() || err.is_request() {
        ModelError::Connection {
            message: err.to_string(),
        }
    } else {
        ModelError::ApiRequest {
            message: err.to_string(),
        }
    }
}

/// Check that the model service answers `GET /api/tags` within `timeout`.
pub async fn probe_model_service(base_url: &str, timeout: Duration) -> Result<(), ModelError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::Connection {
            message: e.to_string(),
        })?;
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| map_send_error(e, timeout.as_secs()))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ModelError::Connection {
            message: format!("HTTP {} from {url}", response.status()),
        })
    }
}

/// Ask the model service to download `model`, waiting until the pull finishes.
pub async fn pull_model(base_url: &str, model: &str, timeout: Duration) -> Result<(), ModelError> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ModelError::Connection {
            message: e.to_string(),
        })?;
    let url = format!("{}/api/pull", base_url.trim_end_matches('/'));
    info!(model, "Pulling model");

    let response = client
        .post(&url)
        .json(&json!({ "model": model, "stream": false }))
        .send()
        .await
        .map_err(|e| map_send_error(e, timeout.as_secs()))?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(map_http_error(status, &body, model));
    }
    if let Ok(json) = serde_json::from_str::<Value>(&body)
        && let Some(error) = json["error"].as_str()
    {
        return Err(ModelError::ApiRequest {
            message: error.to_string(),
        });
    }
    info!(model, "Model ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OllamaModel {
        OllamaModel::new(&ModelConfig::default(), "llama3.2").unwrap()
    }

    #[test]
    fn test_request_body_disables_streaming() {
        let body = model().build_request_body("What is the capital of France?");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["prompt"], "What is the capital of France?");
    }

    #[test]
    fn test_parse_generate_response() {
        let json = json!({"model": "llama3.2", "response": "Paris.", "done": true});
        assert_eq!(parse_generate_response(&json).unwrap(), "Paris.");
    }

    #[test]
    fn test_parse_generate_response_error_field() {
        let json = json!({"error": "model 'llama3.2' not found"});
        let err = parse_generate_response(&json).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            map_http_error(StatusCode::NOT_FOUND, "", "mistral"),
            ModelError::ModelNotFound { ref model } if model == "mistral"
        ));
        assert!(map_http_error(StatusCode::BAD_GATEWAY, "", "mistral").is_retryable());
        assert!(!map_http_error(StatusCode::BAD_REQUEST, "bad", "mistral").is_retryable());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ModelConfig {
            base_url: "http://ollama:11434/".into(),
            ..Default::default()
        };
        let model = OllamaModel::new(&config, "mistral").unwrap();
        assert_eq!(model.base_url, "http://ollama:11434");
        assert_eq!(model.model_name(), "mistral");
    }

    #[tokio::test]
    async fn test_probe_unreachable_service() {
        let result = probe_model_service("http://127.0.0.1:1", Duration::from_millis(500)).await;
        assert!(result.is_err());
    }
}
