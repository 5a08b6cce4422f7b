//! Process-local [`VectorDatabase`] built on [`VectorIndex`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use habit_context_core::index::VectorIndex;
use habit_context_core::{ContextError, ScoredChunk};

use super::{VectorDatabase, VectorPoint};

struct Collection {
    dims: usize,
    index: Option<VectorIndex>,
}

impl Collection {
    fn write(&mut self, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        if let Some(bad) = points.iter().find(|p| p.vector.len() != self.dims) {
            bail!(
                "embedding dimension mismatch: collection has {}, got {}",
                self.dims,
                bad.vector.len()
            );
        }
        let chunks = points.iter().map(|p| p.chunk.clone()).collect();
        let vectors = points.iter().map(|p| p.vector.clone()).collect();
        match &mut self.index {
            Some(index) => {
                index.add(chunks, vectors)?;
            }
            None => self.index = Some(VectorIndex::from_embeddings(chunks, vectors)?),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVectorDatabase {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> anyhow::Error {
    ContextError::NotInitialized(format!("collection {} does not exist", collection)).into()
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        dims: usize,
        points: &[VectorPoint],
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            bail!("collection {} already exists", collection);
        }
        let mut created = Collection { dims, index: None };
        created.write(points)?;
        collections.insert(collection.to_string(), created);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        target.write(points)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(target
            .index
            .as_ref()
            .map(|index| index.search(vector, limit))
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(target.index.as_ref().map_or(0, |index| index.len() as u64))
    }
}
