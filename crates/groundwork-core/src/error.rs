//! Error taxonomy for the RAG core.
//!
//! Configuration and store-invariant violations are caller bugs and are
//! returned immediately. Provider failures (`EmbeddingUnavailable`,
//! `CompletionUnavailable`) are operational conditions: the retriever
//! converts them into [`RagError::RetrievalUnavailable`] and the answer
//! composer turns them into a degraded answer instead of an error.

/// Errors produced by the core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RagError {
    /// Bad chunking or retrieval parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A document or chunk violates a store invariant (empty chunk,
    /// chunk belonging to another document, duplicate position).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Vector length does not match the store's dimensionality.
    #[error("dimension mismatch: store holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed or timed out.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The completion provider failed or timed out.
    #[error("completion provider unavailable: {0}")]
    CompletionUnavailable(String),

    /// Retrieval could not run because the query could not be embedded.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Lookup of a document that is not in the store.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A persistence backend failed to load or save a snapshot.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RagError {
    /// Whether the error is a transient provider condition that a caller
    /// may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable(_)
                | RagError::CompletionUnavailable(_)
                | RagError::RetrievalUnavailable(_)
        )
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RagError::EmbeddingUnavailable("timeout".into()).is_transient());
        assert!(RagError::CompletionUnavailable("503".into()).is_transient());
        assert!(!RagError::InvalidConfiguration("chunk_size".into()).is_transient());
        assert!(!RagError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_transient());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 1536,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: store holds 384-d vectors, got 1536-d"
        );
    }
}
