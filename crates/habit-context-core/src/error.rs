//! Error taxonomy for context stores and file staging.
//!
//! Operations return `anyhow::Result`; the variants below are attached
//! to those errors so callers can classify failures with
//! `err.downcast_ref::<ContextError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    /// A path handed to staging does not exist or is not a regular file.
    #[error("{} does not exist or is not a file", path.display())]
    NotFound { path: PathBuf },

    /// The managed directory or store has not been set up yet.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// The external vector database could not be reached.
    #[error("cannot reach {target}: {message}")]
    Connectivity { target: String, message: String },

    /// The operation exists on the interface but has no implementation.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Classify an `anyhow` error chain, returning the first [`ContextError`].
pub fn classify(err: &anyhow::Error) -> Option<&ContextError> {
    err.chain().find_map(|e| e.downcast_ref::<ContextError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_through_context() {
        let err: anyhow::Result<()> = Err(ContextError::NotImplemented("reindex").into());
        let err = err.context("while reindexing").unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(ContextError::NotImplemented("reindex"))
        ));
    }

    #[test]
    fn test_classify_foreign_error() {
        let err = anyhow::anyhow!("boom");
        assert!(classify(&err).is_none());
    }
}
