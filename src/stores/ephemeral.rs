//! Session-scoped context store backed by an in-memory [`VectorIndex`].

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use habit_context_core::embedding::Embedder;
use habit_context_core::index::VectorIndex;
use habit_context_core::store::ContextStore;
use habit_context_core::{Chunk, RetrievalResult};

enum IndexState {
    Uninitialized,
    Active(VectorIndex),
}

/// Context built from files uploaded in the current session.
///
/// Nothing survives the process. The index is created by the first
/// non-empty ingest and grows with every later one.
pub struct EphemeralContextStore {
    embedder: Arc<dyn Embedder>,
    state: RwLock<IndexState>,
}

impl EphemeralContextStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            state: RwLock::new(IndexState::Uninitialized),
        }
    }

    /// Number of indexed chunks; zero while Uninitialized.
    pub async fn chunk_count(&self) -> usize {
        match &*self.state.read().await {
            IndexState::Uninitialized => 0,
            IndexState::Active(index) => index.len(),
        }
    }
}

#[async_trait]
impl ContextStore for EphemeralContextStore {
    fn name(&self) -> &str {
        "ephemeral"
    }

    async fn is_active(&self) -> bool {
        matches!(*self.state.read().await, IndexState::Active(_))
    }

    async fn ingest(&self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let count = chunks.len();

        let mut state = self.state.write().await;
        match &mut *state {
            IndexState::Active(index) => {
                let added = index.add(chunks, vectors)?;
                debug!(chunks = count, new = added, "extended ephemeral index");
            }
            IndexState::Uninitialized => {
                *state = IndexState::Active(VectorIndex::from_embeddings(chunks, vectors)?);
                info!(chunks = count, "created ephemeral index");
            }
        }
        Ok(count)
    }

    async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 || !self.is_active().await {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(text).await?;
        match &*self.state.read().await {
            IndexState::Active(index) => Ok(index.search(&vector, k)),
            IndexState::Uninitialized => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use habit_context_core::chunk::split_text;
    use habit_context_core::error::classify;
    use habit_context_core::ContextError;

    fn store() -> EphemeralContextStore {
        EphemeralContextStore::new(Arc::new(HashEmbedder::new(128)))
    }

    #[tokio::test]
    async fn test_uninitialized_query_is_empty() {
        let store = store();
        assert!(!store.is_active().await);
        for k in [0, 1, 10] {
            assert!(store.query("anything at all", k).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_ingest_does_not_activate() {
        let store = store();
        assert_eq!(store.ingest(Vec::new()).await.unwrap(), 0);
        assert!(!store.is_active().await);
    }

    #[tokio::test]
    async fn test_ingest_activates_then_extends() {
        let store = store();
        store
            .ingest(split_text("a.txt", "stretch every morning", 1000, 0))
            .await
            .unwrap();
        assert!(store.is_active().await);
        assert_eq!(store.chunk_count().await, 1);

        store
            .ingest(split_text("b.txt", "journal every evening", 1000, 0))
            .await
            .unwrap();
        assert_eq!(store.chunk_count().await, 2);

        let hits = store.query("journal evening", 1).await.unwrap();
        assert_eq!(hits[0].chunk.source, "b.txt");
    }

    #[tokio::test]
    async fn test_reingest_same_content_does_not_duplicate() {
        let store = store();
        let chunks = split_text("a.txt", "drink water", 1000, 0);
        store.ingest(chunks.clone()).await.unwrap();
        store.ingest(chunks).await.unwrap();
        assert_eq!(store.chunk_count().await, 1);
    }

    #[tokio::test]
    async fn test_unimplemented_operations_fail() {
        let store = store();
        let err = store.reindex().await.unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(ContextError::NotImplemented("reindex"))
        ));
        assert!(store.delete_files(&["a.txt".to_string()]).await.is_err());
        assert!(store.lookup_file_ids("a.txt").await.is_err());
    }
}
