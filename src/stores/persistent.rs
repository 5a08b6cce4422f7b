//! Durable context store backed by a named [`VectorDatabase`] collection.
//!
//! # Reattachment
//!
//! [`PersistentContextStore::connect`] asks the database whether the
//! collection already exists. If it does, the store starts Active and
//! later ingests add to what is there. Otherwise it stays Uninitialized
//! until the first non-empty ingest creates the collection together with
//! that batch.
//!
//! # First-ingest race
//!
//! Ingest embeds outside the lock, then takes the state write lock for the
//! database write. The existence check and the creation both happen under
//! that lock, so at most one creation is attempted per store instance and
//! callers that lose the race upsert into the collection the winner made.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use habit_context_core::embedding::Embedder;
use habit_context_core::store::ContextStore;
use habit_context_core::{Chunk, RetrievalResult};

use crate::vector_db::{VectorDatabase, VectorPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectionState {
    Uninitialized,
    Active,
}

pub struct PersistentContextStore {
    db: Arc<dyn VectorDatabase>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    state: RwLock<CollectionState>,
}

impl PersistentContextStore {
    /// Attach to `collection` if it exists, otherwise start Uninitialized.
    ///
    /// Connectivity failures from the database propagate.
    pub async fn connect(
        db: Arc<dyn VectorDatabase>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        let state = if db.collection_exists(&collection).await? {
            let count = db.count(&collection).await?;
            info!(
                collection = %collection,
                db = %db.describe(),
                vectors = count,
                "attached to existing collection"
            );
            CollectionState::Active
        } else {
            info!(
                collection = %collection,
                db = %db.describe(),
                "collection does not exist yet; it will be created on first ingest"
            );
            CollectionState::Uninitialized
        };

        Ok(Self {
            db,
            embedder,
            collection,
            state: RwLock::new(state),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Number of vectors in the collection; zero while Uninitialized.
    pub async fn vector_count(&self) -> Result<u64> {
        if *self.state.read().await == CollectionState::Uninitialized {
            return Ok(0);
        }
        self.db.count(&self.collection).await
    }
}

#[async_trait]
impl ContextStore for PersistentContextStore {
    fn name(&self) -> &str {
        "persistent"
    }

    async fn is_active(&self) -> bool {
        *self.state.read().await == CollectionState::Active
    }

    async fn ingest(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vector(s) for {} chunk(s)",
                vectors.len(),
                chunks.len()
            );
        }
        let dims = vectors.first().map_or(0, Vec::len);
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            bail!("embedder returned vectors of inconsistent dimensions");
        }
        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint { vector, chunk })
            .collect();

        let mut state = self.state.write().await;
        match *state {
            CollectionState::Active => {
                self.db.upsert(&self.collection, &points).await?;
                debug!(collection = %self.collection, points = points.len(), "upserted");
            }
            CollectionState::Uninitialized => {
                // Another process may have created it since connect.
                if self.db.collection_exists(&self.collection).await? {
                    self.db.upsert(&self.collection, &points).await?;
                } else {
                    self.db
                        .create_collection(&self.collection, dims, &points)
                        .await?;
                    info!(
                        collection = %self.collection,
                        dims,
                        points = points.len(),
                        "created collection"
                    );
                }
                *state = CollectionState::Active;
            }
        }
        Ok(points.len())
    }

    async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 || !self.is_active().await {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(text).await?;
        self.db.search(&self.collection, &vector, k).await
    }
}
