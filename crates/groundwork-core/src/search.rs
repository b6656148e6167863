//! Query-side retrieval.
//!
//! The [`Retriever`] embeds a query through the configured
//! [`EmbeddingGateway`], runs a filtered vector search against the
//! [`VectorStore`], and returns the ranked results unchanged.
//!
//! # Retrieval Algorithm
//!
//! 1. Blank queries short-circuit to an empty result (no provider call).
//! 2. Embed the query. A provider failure becomes
//!    [`RagError::RetrievalUnavailable`] so callers can tell "nothing
//!    relevant" apart from "retrieval is broken".
//! 3. Search the store with the configured `similarity_threshold` and a
//!    [`SearchFilter`] built from the caller's owner filter.
//! 4. Return results in store order (descending score, stable ties).

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::models::{SearchFilter, SearchResult};
use crate::store::VectorStore;

/// Minimum cosine similarity a chunk needs to be returned.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Number of results returned when the caller does not ask for a limit.
pub const DEFAULT_TOP_K: usize = 5;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results scoring below this are discarded. Range `[-1.0, 1.0]`.
    pub similarity_threshold: f32,
    /// Default result limit for [`Retriever::retrieve`] callers that pass
    /// no explicit limit (the answer composer, the CLI).
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "retrieval top_k must be >= 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::InvalidConfiguration(format!(
                "similarity_threshold must be within [-1.0, 1.0], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Embeds queries and searches the store.
pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingGateway>,
    config: RetrievalConfig,
}

impl Retriever {
    /// # Errors
    ///
    /// [`RagError::InvalidConfiguration`] if `config` is out of range.
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingGateway>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the `top_k` chunks most similar to `query`, restricted to
    /// chunks owned by `owner_filter` when given.
    pub async fn retrieve(
        &self,
        query: &str,
        owner_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.retrieve_filtered(query, &SearchFilter::for_agent(owner_filter), top_k)
            .await
    }

    /// Like [`retrieve`](Self::retrieve) with the full filter: owner,
    /// industry and document type.
    ///
    /// # Errors
    ///
    /// - [`RagError::RetrievalUnavailable`] when the query cannot be
    ///   embedded. The provider's message is logged, not returned.
    /// - [`RagError::DimensionMismatch`] when the embedding model does not
    ///   match the vectors already in the store.
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(model = self.embedder.model_name(), error = %e, "query embedding failed");
                return Err(RagError::RetrievalUnavailable(
                    "query could not be embedded".to_string(),
                ));
            }
        };

        let results = self.store.search(
            &query_vec,
            top_k,
            self.config.similarity_threshold,
            |chunk| filter.matches(&chunk.metadata),
        )?;

        debug!(
            results = results.len(),
            top_k,
            threshold = self.config.similarity_threshold,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieve"
        );
        Ok(results)
    }
}
