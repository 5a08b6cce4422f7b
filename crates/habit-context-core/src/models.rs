//! Core data models shared by the chunker, the stores, and retrieval.

use serde::{Deserialize, Serialize};

/// A contiguous segment of a source document.
///
/// `source` records provenance (the staged file the text came from) and
/// `chunk_index` its position within that file. `hash` is the SHA-256 of
/// `text`; `id` is derived from all three so identical input always
/// produces identical chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk paired with its relevance score against a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity between the query and the stored embedding.
    pub score: f64,
}

/// Ordered retrieval output: descending by score within a single store,
/// never longer than the requested `k`.
pub type RetrievalResult = Vec<ScoredChunk>;
