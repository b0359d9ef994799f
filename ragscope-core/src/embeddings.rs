//! Pluggable embedding providers.
//!
//! Provides an async trait over embedding models with two implementations:
//! the Ollama `/api/embed` endpoint used in deployments, and a local hashed
//! bag-of-words embedder that needs no model service (offline runs, tests).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::models::ollama::{map_http_error, map_send_error};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Embed a batch of texts. The output has one vector per input, in order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name: "ollama" (default) or "local".
    pub provider: String,
    /// Dimensions of the local embedder. Ollama models report their own.
    pub dimensions: usize,
    /// Number of texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            dimensions: 384,
            batch_size: 32,
        }
    }
}

/// Local term-frequency embedder.
///
/// Each lowercased alphanumeric token is hashed into one of `dimensions`
/// buckets and the vector is L2-normalized, so texts sharing vocabulary land
/// close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimensions] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(self.embed_text(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// Ollama embedder (uses the `/api/embed` endpoint).
pub struct OllamaEmbedder {
    client: Client,
    model: String,
    base_url: String,
    batch_size: usize,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(models: &ModelConfig, batch_size: usize) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(models.request_timeout_secs))
            .build()
            .map_err(|e| ModelError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            model: models.embedding_model.clone(),
            base_url: models.base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            timeout_secs: models.request_timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        debug!(url = %url, model = %self.model, count = texts.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ModelError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(map_http_error(status, &text, &self.model));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| ModelError::ResponseParse {
            message: format!("Invalid JSON: {e}"),
        })?;
        let vectors = parse_embeddings(&json)?;
        if vectors.len() != texts.len() {
            return Err(ModelError::ResponseParse {
                message: format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            });
        }
        Ok(vectors)
    }
}

/// Extract the `embeddings` array of an `/api/embed` response.
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>, ModelError> {
    let rows = json["embeddings"]
        .as_array()
        .ok_or_else(|| ModelError::ResponseParse {
            message: "response has no 'embeddings' array".to_string(),
        })?;
    Ok(rows
        .iter()
        .map(|row| {
            row.as_array()
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect())
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ModelError::ResponseParse {
            message: "empty embedding response".to_string(),
        })
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

/// Factory function to create an embedder based on configuration.
pub fn create_embedder(
    config: &EmbeddingConfig,
    models: &ModelConfig,
) -> Result<Arc<dyn Embedder>, ModelError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(models, config.batch_size)?)),
        other => {
            tracing::warn!(
                provider = other,
                "Unknown embedding provider, falling back to ollama"
            );
            Ok(Arc::new(OllamaEmbedder::new(models, config.batch_size)?))
        }
    }
}
