//! In-process vector store. Contents are lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{ChunkRecord, RetrievedChunk, VectorStore, rank};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<ChunkRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, StoreError> {
        let written = records.len();
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let entries = collections.entry(collection.to_string()).or_default();
        for record in records {
            match entries.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => entries.push(record),
            }
        }
        Ok(written)
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(collection).map_or(0, Vec::len))
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        rank(
            entries.iter().map(|r| {
                (
                    r.id.clone(),
                    r.text.clone(),
                    r.metadata.clone(),
                    r.vector.clone(),
                )
            }),
            query,
            k,
        )
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMetadata;

    fn record(id: &str, text: &str, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            text: text.to_string(),
            vector,
            metadata: ChunkMetadata {
                source: "notes.txt".into(),
                page: None,
                start_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_count_unknown_collection_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.count("documents").await.unwrap(), 0);
        assert!(store.search("documents", &[1.0], 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = MemoryStore::new();
        store
            .upsert(
                "documents",
                vec![record("a_0", "old", vec![1.0, 0.0]), record("a_1", "x", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        store
            .upsert("documents", vec![record("a_0", "new", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.count("documents").await.unwrap(), 2);
        let hits = store.search("documents", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = MemoryStore::new();
        store
            .upsert("handbook", vec![record("h_0", "policy", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(store.count("handbook").await.unwrap(), 1);
        assert_eq!(store.count("documents").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_returns_at_most_k() {
        let store = MemoryStore::new();
        let records = (0..10)
            .map(|i| record(&format!("r_{i}"), "t", vec![1.0, i as f32]))
            .collect();
        store.upsert("documents", records).await.unwrap();
        let hits = store.search("documents", &[1.0, 0.0], 4).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].id, "r_0");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
