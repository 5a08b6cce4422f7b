//! Retrieval facade and result merging.
//!
//! [`search`] is pure delegation to a store's `query`. When several stores
//! are consulted, [`merge_results`] concatenates their results in store
//! order without re-ranking or de-duplicating. [`build_prompt`] splices
//! merged results into the text handed to the model.

use anyhow::Result;

use crate::models::{RetrievalResult, ScoredChunk};
use crate::store::ContextStore;

/// Header placed above retrieved context in [`build_prompt`].
pub const CONTEXT_HEADER: &str = "Relevant context:";

/// Query one store for its top-`k` chunks.
pub async fn search(store: &dyn ContextStore, query: &str, k: usize) -> Result<RetrievalResult> {
    store.query(query, k).await
}

/// Concatenate per-store results in the order given.
///
/// Scores from different stores are not compared, and a chunk present in
/// two stores appears twice.
pub fn merge_results<I>(results: I) -> RetrievalResult
where
    I: IntoIterator<Item = RetrievalResult>,
{
    results.into_iter().flatten().collect()
}

/// Render retrieved chunks as a context block followed by `user_input`.
///
/// Returns `user_input` unchanged when `results` is empty.
///
/// ```rust
/// use habit_context_core::search::build_prompt;
///
/// assert_eq!(build_prompt("hi", &[]), "hi");
/// ```
pub fn build_prompt(user_input: &str, results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return user_input.to_string();
    }
    let mut prompt = String::from(CONTEXT_HEADER);
    prompt.push('\n');
    for r in results {
        prompt.push_str(r.chunk.text.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(user_input);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;
    use crate::models::Chunk;
    use async_trait::async_trait;

    fn scored(source: &str, text: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk: split_text(source, text, 1000, 0).remove(0),
            score,
        }
    }

    struct FixedStore(RetrievalResult);

    #[async_trait]
    impl ContextStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn is_active(&self) -> bool {
            true
        }
        async fn ingest(&self, chunks: Vec<Chunk>) -> Result<usize> {
            Ok(chunks.len())
        }
        async fn query(&self, _text: &str, k: usize) -> Result<RetrievalResult> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_search_delegates() {
        let store = FixedStore(vec![scored("a", "one", 0.9), scored("a", "two", 0.5)]);
        let results = search(&store, "anything", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "one");
    }

    #[tokio::test]
    async fn test_default_methods_not_implemented() {
        use crate::error::{classify, ContextError};

        let store = FixedStore(Vec::new());
        let err = store.reindex().await.unwrap_err();
        assert!(matches!(classify(&err), Some(ContextError::NotImplemented("reindex"))));
        assert!(store.delete_files(&["a.txt".to_string()]).await.is_err());
        assert!(store.delete_concept("cats").await.is_err());
        assert!(store.lookup_file_ids("a.txt").await.is_err());
        assert!(store.ids_from_concept("cats").await.is_err());
    }

    #[test]
    fn test_merge_concatenates_without_reranking() {
        let ephemeral = vec![scored("e", "low", 0.1)];
        let persistent = vec![scored("p", "high", 0.9), scored("e", "low", 0.1)];
        let merged = merge_results(vec![ephemeral, persistent]);
        let texts: Vec<&str> = merged.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["low", "high", "low"]);
    }

    #[test]
    fn test_build_prompt_with_context() {
        let results = vec![scored("a", "Cats purr.", 0.8), scored("b", "Dogs bark.", 0.7)];
        let prompt = build_prompt("Why do cats purr?", &results);
        assert_eq!(
            prompt,
            "Relevant context:\nCats purr.\n\nDogs bark.\n\nWhy do cats purr?"
        );
    }
}
