//! Configuration system for RAGScope.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! legacy environment variables -> `RAGSCOPE_` environment variables.
//! Configuration is loaded from `~/.config/ragscope/config.toml` and/or
//! `.ragscope/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::store::StoreConfig;
use crate::tracking::TrackingConfig;

/// Flat environment variables understood for compatibility with existing
/// deployments, and the config path each one maps to.
const LEGACY_ENV_KEYS: [(&str, &str); 7] = [
    ("OLLAMA_MODEL", "models.generation_model"),
    ("OLLAMA_JUDGE_MODEL", "models.judge_model"),
    ("OLLAMA_EMBED_MODEL", "models.embedding_model"),
    ("OLLAMA_BASE_URL", "models.base_url"),
    ("CHROMA_PERSIST_DIR", "store.persist_dir"),
    ("CHROMA_COLLECTION", "store.collection"),
    ("MLFLOW_TRACKING_URI", "tracking.tracking_uri"),
];

/// Top-level configuration for RAGScope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Model service configuration shared by the generation, judge and
/// embedding adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Ollama-compatible model service.
    pub base_url: String,
    /// Model that answers questions.
    pub generation_model: String,
    /// Model that scores answers.
    pub judge_model: String,
    /// Model that produces embeddings.
    pub embedding_model: String,
    /// Sampling temperature for generation and judge calls.
    pub temperature: f32,
    /// Upper bound for a single generation or judge call.
    pub request_timeout_secs: u64,
    /// Upper bound for liveness probes.
    pub health_timeout_secs: u64,
    /// When set, the answer template asks the model to reply in this language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_language: Option<String>,
    pub retry: RetryConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generation_model: "llama3.2".to_string(),
            judge_model: "mistral".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            temperature: 0.0,
            request_timeout_secs: 300,
            health_timeout_secs: 5,
            answer_language: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for transient model-service failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Document ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4000,
            chunk_overlap: 20,
        }
    }
}

impl IngestConfig {
    /// The smaller preset: more, tighter chunks.
    pub fn compact() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_mb: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// `top_k` used when a request does not specify one.
    pub default_top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_top_k: 4 }
    }
}

impl RagConfig {
    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.ingest.chunk_size == 0 {
            return invalid("ingest.chunk_size must be greater than 0");
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return invalid("ingest.chunk_overlap must be smaller than ingest.chunk_size");
        }
        if self.query.default_top_k == 0 {
            return invalid("query.default_top_k must be at least 1");
        }
        if self.models.generation_model.trim().is_empty()
            || self.models.judge_model.trim().is_empty()
            || self.models.embedding_model.trim().is_empty()
        {
            return invalid("model names must not be empty");
        }
        if self.store.collection.trim().is_empty() {
            return invalid("store.collection must not be empty");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("cannot render configuration: {e}"),
        })
    }
}

/// Environment provider for the flat legacy variable names.
fn legacy_env() -> Env {
    let keys: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(key, _)| *key).collect();
    Env::raw().only(&keys).map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(legacy, _)| key.as_str().eq_ignore_ascii_case(legacy))
            .map(|(_, path)| (*path).into())
            .unwrap_or_else(|| key.as_str().to_owned().into())
    })
}

/// Build the layered figment without extracting it.
///
/// Priority (highest to lowest):
/// 1. Environment variables prefixed with `RAGSCOPE_` (`RAGSCOPE_MODELS__JUDGE_MODEL`)
/// 2. Legacy flat variables (`OLLAMA_MODEL`, `MLFLOW_TRACKING_URI`, ...)
/// 3. Explicit config file, or workspace-local `.ragscope/config.toml`
/// 4. User config (`~/.config/ragscope/config.toml`)
/// 5. Built-in defaults
pub fn figment(workspace: Option<&Path>, config_file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "ragscope", "ragscope") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    match (config_file, workspace) {
        (Some(file), _) => figment = figment.merge(Toml::file(file)),
        (None, Some(ws)) => {
            let ws_config = ws.join(".ragscope").join("config.toml");
            if ws_config.exists() {
                figment = figment.merge(Toml::file(&ws_config));
            }
        }
        (None, None) => {}
    }

    figment
        .merge(legacy_env())
        .merge(Env::prefixed("RAGSCOPE_").split("__"))
}

/// Load and validate configuration from layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<RagConfig, ConfigError> {
    if let Some(file) = config_file
        && !file.exists()
    {
        return Err(ConfigError::FileNotFound {
            path: file.to_path_buf(),
        });
    }

    let config: RagConfig = figment(workspace, config_file)
        .extract()
        .map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
