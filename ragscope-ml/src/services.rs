//! Service container.
//!
//! Every adapter is built once at startup and shared as an `Arc<dyn Trait>`
//! between the ingestion pipeline, the query pipeline, and health probes.

use ragscope_core::config::RagConfig;
use ragscope_core::embeddings::{Embedder, create_embedder};
use ragscope_core::error::RagError;
use ragscope_core::models::{ModelAdapter, OllamaModel};
use ragscope_core::store::{VectorStore, create_store};
use ragscope_core::tracking::{ExperimentRecorder, create_recorder};
use std::sync::Arc;
use tracing::info;

use crate::rag::{IngestPipeline, QueryPipeline, RecursiveSplitter};

/// The external dependencies a [`RagServices`] is assembled from.
#[derive(Clone)]
pub struct Adapters {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub generator: Arc<dyn ModelAdapter>,
    pub judge: Arc<dyn ModelAdapter>,
    pub recorder: Arc<dyn ExperimentRecorder>,
}

impl Adapters {
    /// Build the adapters named by `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self, RagError> {
        let embedder = create_embedder(&config.embedding, &config.models)
            .map_err(|e| RagError::internal(format!("cannot build embedder: {e}")))?;
        let store = create_store(&config.store)?;
        let generator = OllamaModel::new(&config.models, &config.models.generation_model)
            .map_err(|e| RagError::internal(format!("cannot build generation model: {e}")))?;
        let judge = OllamaModel::new(&config.models, &config.models.judge_model)
            .map_err(|e| RagError::internal(format!("cannot build judge model: {e}")))?;
        let recorder = create_recorder(&config.tracking)
            .map_err(|e| RagError::internal(format!("cannot build experiment recorder: {e}")))?;

        Ok(Self {
            embedder,
            store,
            generator: Arc::new(generator),
            judge: Arc::new(judge),
            recorder,
        })
    }
}

/// Shared application services.
pub struct RagServices {
    pub config: RagConfig,
    pub adapters: Adapters,
    pub ingest: IngestPipeline,
    pub query: QueryPipeline,
}

impl RagServices {
    /// Build real adapters from `config` and wire the pipelines.
    pub fn from_config(config: RagConfig) -> Result<Self, RagError> {
        let adapters = Adapters::from_config(&config)?;
        info!(
            embedder = adapters.embedder.provider_name(),
            store = adapters.store.backend_name(),
            recorder = adapters.recorder.backend_name(),
            generation_model = adapters.generator.model_name(),
            judge_model = adapters.judge.model_name(),
            "Services initialized"
        );
        Ok(Self::with_adapters(config, adapters))
    }

    /// Wire the pipelines around already-built adapters.
    pub fn with_adapters(config: RagConfig, adapters: Adapters) -> Self {
        let collection = config.store.collection.clone();
        let ingest = IngestPipeline::new(
            adapters.embedder.clone(),
            adapters.store.clone(),
            RecursiveSplitter::from_config(&config.ingest),
            collection.clone(),
        );
        let query = QueryPipeline::new(
            adapters.embedder.clone(),
            adapters.store.clone(),
            adapters.generator.clone(),
            adapters.judge.clone(),
            adapters.recorder.clone(),
            collection,
        )
        .with_answer_language(config.models.answer_language.clone());

        Self {
            config,
            adapters,
            ingest,
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragscope_core::embeddings::LocalEmbedder;
    use ragscope_core::models::MockModel;
    use ragscope_core::store::MemoryStore;
    use ragscope_core::tracking::MemoryRecorder;

    #[test]
    fn test_with_adapters_uses_configured_collection() {
        let mut config = RagConfig::default();
        config.store.collection = "handbook".into();
        let services = RagServices::with_adapters(
            config,
            Adapters {
                embedder: Arc::new(LocalEmbedder::new(32)),
                store: Arc::new(MemoryStore::new()),
                generator: Arc::new(MockModel::new("llama3.2")),
                judge: Arc::new(MockModel::new("mistral")),
                recorder: Arc::new(MemoryRecorder::new("rag-evaluation")),
            },
        );
        assert_eq!(services.ingest.collection(), "handbook");
        assert_eq!(services.query.collection(), "handbook");
    }

    #[test]
    fn test_from_config_offline_backends() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = RagConfig::default();
        config.embedding.provider = "local".into();
        config.store.persist_dir = dir.path().join("store");
        config.tracking.local_dir = dir.path().join("runs");
        let services = RagServices::from_config(config).unwrap();
        assert_eq!(services.adapters.store.backend_name(), "sqlite");
        assert_eq!(services.adapters.recorder.backend_name(), "file");
        assert_eq!(services.adapters.judge.model_name(), "mistral");
    }
}
