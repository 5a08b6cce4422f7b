//! Context store abstraction.
//!
//! A [`ContextStore`] indexes chunks by their embeddings and answers
//! nearest-neighbour queries. Both lifecycles (the per-session ephemeral
//! store and the database-backed persistent store) implement it.
//!
//! # Lifecycle
//!
//! A store starts Uninitialized and becomes Active on the first
//! non-empty [`ingest`](ContextStore::ingest). Querying an Uninitialized
//! store yields an empty result, never an error.
//!
//! # Unimplemented operations
//!
//! Deletion, concept deletion, reindexing, and id lookups are part of the
//! interface but have no backing implementation yet. Their default bodies
//! fail with [`ContextError::NotImplemented`] so a caller can never mistake
//! them for a successful no-op.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ContextError;
use crate::models::{Chunk, RetrievalResult};

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Short label used in logs and API responses (e.g. `"ephemeral"`).
    fn name(&self) -> &str;

    /// Whether the store has left the Uninitialized state.
    async fn is_active(&self) -> bool;

    /// Embed and index `chunks`. Returns the number of chunks written.
    ///
    /// Ingesting zero chunks is a no-op and does not activate the store.
    async fn ingest(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Return up to `k` chunks most similar to `text`, best first.
    async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult>;

    /// Remove the embeddings sourced from `files`.
    async fn delete_files(&self, _files: &[String]) -> Result<Vec<String>> {
        Err(ContextError::NotImplemented("delete_files").into())
    }

    /// Remove the embeddings related to a concept query.
    async fn delete_concept(&self, _concept_query: &str) -> Result<()> {
        Err(ContextError::NotImplemented("delete_concept").into())
    }

    /// Rebuild the index to keep queries fast.
    async fn reindex(&self) -> Result<()> {
        Err(ContextError::NotImplemented("reindex").into())
    }

    /// List embedding ids produced from `file`.
    async fn lookup_file_ids(&self, _file: &str) -> Result<Vec<String>> {
        Err(ContextError::NotImplemented("lookup_file_ids").into())
    }

    /// List embedding ids related to a concept query.
    async fn ids_from_concept(&self, _concept_query: &str) -> Result<Vec<String>> {
        Err(ContextError::NotImplemented("ids_from_concept").into())
    }
}
