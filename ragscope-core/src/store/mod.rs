//! Vector store adapters.
//!
//! Chunks live in named collections. Writes are upserts keyed by chunk id, and
//! searches rank by cosine similarity with ties broken by insertion order.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StoreError;

/// Configuration for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend name: "sqlite" (default) or "memory".
    pub backend: String,
    /// Directory holding the SQLite database.
    pub persist_dir: PathBuf,
    /// Collection that ingestion writes to and queries read from.
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            persist_dir: PathBuf::from(".ragscope/store"),
            collection: "documents".into(),
        }
    }
}

/// Provenance stored alongside each chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name the chunk was loaded from.
    pub source: String,
    /// Zero-based page number for paginated documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Character offset of the chunk within its page or document.
    #[serde(default)]
    pub start_index: usize,
}

/// A chunk ready to be written: text, embedding, and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// A store of embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert `records` into `collection`, replacing any with the same id.
    /// Returns the number of records written.
    async fn upsert(&self, collection: &str, records: Vec<ChunkRecord>)
    -> Result<usize, StoreError>;

    /// Number of chunks in `collection`; zero when it does not exist.
    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// The `k` chunks most similar to `query`, best first.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend_name(&self) -> &str;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank `(id, text, metadata, vector)` candidates already in insertion order.
///
/// The sort is stable, so equal scores keep their insertion order.
pub(crate) fn rank<I>(candidates: I, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, StoreError>
where
    I: IntoIterator<Item = (String, String, ChunkMetadata, Vec<f32>)>,
{
    let mut scored = Vec::new();
    for (id, text, metadata, vector) in candidates {
        if vector.len() != query.len() {
            return Err(StoreError::DimensionMismatch {
                expected: vector.len(),
                actual: query.len(),
            });
        }
        let score = cosine_similarity(query, &vector);
        scored.push(RetrievedChunk {
            id,
            text,
            metadata,
            score,
        });
    }
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    Ok(scored)
}

/// Build the configured vector store.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::open(
            config.persist_dir.join("ragscope.db"),
        )?)),
        other => {
            tracing::warn!(backend = other, "Unknown store backend, falling back to sqlite");
            Ok(Arc::new(SqliteStore::open(
                config.persist_dir.join("ragscope.db"),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, vector: Vec<f32>) -> (String, String, ChunkMetadata, Vec<f32>) {
        (
            id.to_string(),
            format!("text of {id}"),
            ChunkMetadata::default(),
            vector,
        )
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_score_then_insertion() {
        let ranked = rank(
            vec![
                candidate("a", vec![0.0, 1.0]),
                candidate("b", vec![1.0, 0.0]),
                candidate("c", vec![2.0, 0.0]),
                candidate("d", vec![1.0, 1.0]),
            ],
            &[1.0, 0.0],
            3,
        )
        .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_rank_rejects_dimension_mismatch() {
        let err = rank(vec![candidate("a", vec![1.0, 0.0, 0.0])], &[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.collection, "documents");
    }

    #[test]
    fn test_create_memory_store() {
        let config = StoreConfig {
            backend: "memory".into(),
            ..Default::default()
        };
        assert_eq!(create_store(&config).unwrap().backend_name(), "memory");
    }
}
