//! Vector-database clients for the persistent context store.
//!
//! A [`VectorDatabase`] holds named collections of embedded chunks that
//! outlive the process. Three backends are available, selected by
//! `[vector_db].backend`:
//!
//! - **`qdrant`**: a Qdrant server over its REST API ([`QdrantClient`]).
//! - **`sqlite`**: a local SQLite file with brute-force cosine search
//!   ([`SqliteVectorDatabase`]).
//! - **`memory`**: process-local collections ([`InMemoryVectorDatabase`]),
//!   for development runs without a database.

mod memory;
mod qdrant;
mod sqlite;

pub use memory::InMemoryVectorDatabase;
pub use qdrant::QdrantClient;
pub use sqlite::SqliteVectorDatabase;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use habit_context_core::{Chunk, ScoredChunk};

use crate::config::VectorDbConfig;

/// A chunk with its embedding, ready to be written to a collection.
///
/// The point id is the chunk id, so writing the same chunk twice
/// overwrites instead of duplicating.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

#[async_trait]
pub trait VectorDatabase: Send + Sync {
    /// Human-readable location, for logs (e.g. `qdrant http://localhost:6333`).
    fn describe(&self) -> String;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create `collection` with `dims`-dimensional cosine vectors and write
    /// `points` into it.
    ///
    /// Fails if the collection already exists. If writing the points fails
    /// the collection is removed again, so a failed create leaves nothing
    /// behind.
    async fn create_collection(
        &self,
        collection: &str,
        dims: usize,
        points: &[VectorPoint],
    ) -> Result<()>;

    /// Insert or overwrite `points` in an existing collection.
    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()>;

    /// Return up to `limit` points most similar to `vector`, best first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of points stored in `collection`.
    async fn count(&self, collection: &str) -> Result<u64>;
}

/// Connect to the backend named by `config.backend`.
pub async fn connect(config: &VectorDbConfig) -> Result<Arc<dyn VectorDatabase>> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantClient::connect(config).await?)),
        "sqlite" => {
            let Some(path) = &config.path else {
                bail!("vector_db.path must be set when backend is 'sqlite'");
            };
            Ok(Arc::new(SqliteVectorDatabase::open(path).await?))
        }
        "memory" => Ok(Arc::new(InMemoryVectorDatabase::new())),
        other => bail!("Unknown vector_db backend: {}", other),
    }
}
