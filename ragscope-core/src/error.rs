//! Error types for RAGScope.
//!
//! Uses `thiserror` for public API error types. Adapter failures (model,
//! vector store, experiment tracking, configuration) have their own enums and
//! are folded into the pipeline-level [`RagError`] taxonomy at the boundary.

use std::path::PathBuf;

/// Pipeline-level error taxonomy.
///
/// Callers pattern-match on the variant to decide how to surface a failure;
/// the HTTP gateway maps each variant to a stable status code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RagError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("{service} unavailable: {message}")]
    DependencyUnavailable { service: String, message: String },

    #[error("Judge could not score {metric}: {reason}")]
    JudgeUnscoreable { metric: String, reason: String },

    #[error("{message}")]
    Internal { message: String },
}

impl RagError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant, used as a tag value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::DependencyUnavailable { .. } => "dependency_unavailable",
            Self::JudgeUnscoreable { .. } => "judge_unscoreable",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Errors from generation, judge, and embedding model calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Model service connection failed: {message}")]
    Connection { message: String },
}

impl ModelError {
    /// Whether the error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Errors from vector store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed entry '{id}': {reason}")]
    MalformedEntry { id: String, reason: String },

    #[error("Vector store task failed: {message}")]
    Task { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from experiment recorders.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Tracking request failed: {message}")]
    Request { message: String },

    #[error("Tracking server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run already closed: {run_id}")]
    RunClosed { run_id: String },

    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

impl From<ModelError> for RagError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Connection { .. } | ModelError::Timeout { .. } => {
                RagError::unavailable("model service", err.to_string())
            }
            other => RagError::internal(other.to_string()),
        }
    }
}

impl From<StoreError> for RagError {
    fn from(err: StoreError) -> Self {
        RagError::unavailable("vector store", err.to_string())
    }
}

impl From<TrackingError> for RagError {
    fn from(err: TrackingError) -> Self {
        RagError::unavailable("experiment tracker", err.to_string())
    }
}

/// A type alias for results using [`RagError`].
pub type Result<T> = std::result::Result<T, RagError>;
