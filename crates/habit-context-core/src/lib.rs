//! # Habit Context Core
//!
//! Shared logic for Habit Context: data models, the fixed-size chunker,
//! the [`Embedder`](embedding::Embedder) trait, an in-memory vector index,
//! the [`ContextStore`](store::ContextStore) trait, and the retrieval facade.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete embedders, vector-database backends, and the two store
//! lifecycles live in the `habit-context` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod store;

pub use error::ContextError;
pub use models::{Chunk, RetrievalResult, ScoredChunk};
