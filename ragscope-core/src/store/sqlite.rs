//! SQLite-backed vector store.
//!
//! Vectors are stored as little-endian `f32` blobs and scored in process.
//! Every operation opens its own connection on a blocking thread.

use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ChunkMetadata, ChunkRecord, RetrievedChunk, VectorStore, rank};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    text       TEXT NOT NULL,
    vector     BLOB NOT NULL,
    metadata   TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
";

pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %db_path.display(), "Opened SQLite vector store");
        Ok(Self { db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(
        &self,
        collection: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chunks (collection, id, text, vector, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (collection, id) DO UPDATE SET
                        text = excluded.text,
                        vector = excluded.vector,
                        metadata = excluded.metadata",
                )?;
                for record in &records {
                    let metadata = serde_json::to_string(&record.metadata).map_err(|e| {
                        StoreError::MalformedEntry {
                            id: record.id.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    stmt.execute(params![
                        collection,
                        record.id,
                        record.text,
                        encode_vector(&record.vector),
                        metadata
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let collection = collection.to_string();
        let query = query.to_vec();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, text, vector, metadata FROM chunks
                 WHERE collection = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut candidates = Vec::new();
            for row in rows {
                let (id, text, blob, metadata) = row?;
                let metadata: ChunkMetadata =
                    serde_json::from_str(&metadata).map_err(|e| StoreError::MalformedEntry {
                        id: id.clone(),
                        reason: e.to_string(),
                    })?;
                candidates.push((id, text, metadata, decode_vector(&blob)));
            }
            rank(candidates, &query, k)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}
