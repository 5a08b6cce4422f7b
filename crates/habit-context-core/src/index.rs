//! In-memory vector index.
//!
//! Brute-force cosine similarity over every stored vector. Entries are
//! keyed by chunk id: adding a chunk whose id is already indexed replaces
//! the old entry instead of duplicating it.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A non-empty index of chunk embeddings with a fixed dimensionality.
pub struct VectorIndex {
    dims: usize,
    entries: Vec<IndexedChunk>,
    positions: HashMap<String, usize>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dims", &self.dims)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl VectorIndex {
    /// Build an index from chunks and their embeddings.
    ///
    /// Fails when the inputs are empty, their lengths differ, or the
    /// vectors do not share one dimensionality.
    pub fn from_embeddings(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dims = match vectors.first() {
            Some(v) if !v.is_empty() => v.len(),
            Some(_) => bail!("cannot index zero-dimensional embeddings"),
            None => bail!("cannot build a vector index from zero chunks"),
        };
        let mut index = Self {
            dims,
            entries: Vec::with_capacity(chunks.len()),
            positions: HashMap::new(),
        };
        index.add(chunks, vectors)?;
        Ok(index)
    }

    /// Add or replace entries. Returns the number of new ids indexed.
    pub fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            bail!(
                "embedding dimension mismatch: index has {}, got {}",
                self.dims,
                bad.len()
            );
        }

        let mut added = 0;
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            match self.positions.get(&chunk.id) {
                Some(&pos) => self.entries[pos] = IndexedChunk { chunk, vector },
                None => {
                    self.positions.insert(chunk.id.clone(), self.entries.len());
                    self.entries.push(IndexedChunk { chunk, vector });
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Return the `k` entries most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> RetrievalResult {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector) as f64,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
