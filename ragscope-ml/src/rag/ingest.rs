//! Document ingestion: load, split, embed, upsert.

use ragscope_core::embeddings::Embedder;
use ragscope_core::error::RagError;
use ragscope_core::store::{ChunkMetadata, ChunkRecord, VectorStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::rag::chunk::RecursiveSplitter;
use crate::rag::loader::{DocumentKind, load_document};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: String,
    pub chunks_stored: usize,
    pub filename: String,
}

/// Writes documents into one collection of the vector store.
pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    splitter: RecursiveSplitter,
    collection: String,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        splitter: RecursiveSplitter,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            splitter,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ingest an uploaded document.
    ///
    /// Chunk ids are `{filename}_{index}`, so ingesting the same filename
    /// again overwrites chunks index by index.
    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestReport, RagError> {
        let filename = base_name(filename);
        if filename.is_empty() {
            return Err(RagError::invalid_input("No file provided."));
        }
        DocumentKind::from_filename(&filename)?;

        let name = filename.clone();
        let document = tokio::task::spawn_blocking(move || load_document(&name, &bytes))
            .await
            .map_err(|e| RagError::internal(format!("document loader failed: {e}")))??;

        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for page in &document.pages {
            for chunk in self.splitter.split(&page.text) {
                metadata.push(ChunkMetadata {
                    source: filename.clone(),
                    page: page.number,
                    start_index: chunk.start_index,
                });
                texts.push(chunk.text);
            }
        }
        debug!(filename = %filename, pages = document.pages.len(), chunks = texts.len(), "Document split");

        if texts.is_empty() {
            info!(filename = %filename, "Document contained no text");
            return Ok(IngestReport {
                status: "ok".into(),
                chunks_stored: 0,
                filename,
            });
        }

        let vectors = self
            .embedder
            .embed_many(&texts)
            .await
            .map_err(|e| RagError::unavailable("embedding service", e.to_string()))?;
        if vectors.len() != texts.len() {
            return Err(RagError::unavailable(
                "embedding service",
                format!("expected {} vectors, received {}", texts.len(), vectors.len()),
            ));
        }

        let records: Vec<ChunkRecord> = texts
            .into_iter()
            .zip(vectors)
            .zip(metadata)
            .enumerate()
            .map(|(index, ((text, vector), metadata))| ChunkRecord {
                id: format!("{filename}_{index}"),
                text,
                vector,
                metadata,
            })
            .collect();

        let chunks_stored = self.store.upsert(&self.collection, records).await?;
        info!(filename = %filename, chunks_stored, collection = %self.collection, "Document ingested");

        Ok(IngestReport {
            status: "ok".into(),
            chunks_stored,
            filename,
        })
    }
}

/// Strip any client-supplied directory components from an upload name.
fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
