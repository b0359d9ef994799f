//! # RAGScope Core
//!
//! Adapters and shared plumbing for the RAGScope service: layered
//! configuration, the error taxonomy, embedding providers, text-generation
//! models, vector stores, and experiment recorders.
//!
//! Every external dependency sits behind a trait so pipelines can be wired
//! with real services in production and scripted doubles in tests:
//!
//! - [`embeddings::Embedder`]: Ollama `/api/embed` or a local hashed embedder
//! - [`models::ModelAdapter`]: Ollama `/api/generate` or [`models::MockModel`]
//! - [`store::VectorStore`]: SQLite or in-memory
//! - [`tracking::ExperimentRecorder`]: MLflow, local JSON files, or in-memory

pub mod config;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod persistence;
pub mod store;
pub mod tracking;

pub use config::{RagConfig, load_config};
pub use embeddings::{Embedder, EmbeddingConfig, LocalEmbedder, OllamaEmbedder, create_embedder};
pub use error::{ConfigError, ModelError, RagError, Result, StoreError, TrackingError};
pub use models::{MockModel, ModelAdapter, OllamaModel};
pub use store::{
    ChunkMetadata, ChunkRecord, MemoryStore, RetrievedChunk, SqliteStore, StoreConfig,
    VectorStore, create_store,
};
pub use tracking::{
    ExperimentRecorder, FileRecorder, MemoryRecorder, MlflowRecorder, RunRecord, RunStatus,
    TrackingConfig, create_recorder,
};
