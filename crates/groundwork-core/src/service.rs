//! The RAG core API.
//!
//! [`RagService`] composes the chunker, the embedding gateway, the
//! [`VectorStore`], the [`Retriever`] and the [`AnswerComposer`] behind
//! the operations an outer layer (CLI, HTTP handler, test) calls:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`add_document`](RagService::add_document) | chunk, embed, insert atomically |
//! | [`delete_document`](RagService::delete_document) | cascade delete |
//! | [`search`](RagService::search) | filtered vector search |
//! | [`answer`](RagService::answer) | grounded answer with citations |
//! | [`embed_pending`](RagService::embed_pending) | retry chunks whose embedding failed |
//!
//! Mutations of one document id are serialized by a per-document async
//! lock held across the embedding call and the insert, so a delete can
//! never interleave with an in-flight insert of the same document.
//! Different documents proceed concurrently.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::answer::{AnswerComposer, ComposerConfig};
use crate::chunk::{chunk_document, ChunkingOptions};
use crate::completion::CompletionGateway;
use crate::embedding::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::models::{Answer, Document, DocumentChunk, NewDocument, SearchFilter, SearchResult};
use crate::search::{RetrievalConfig, Retriever};
use crate::store::{Persistence, StoreStats, VectorStore};

/// Settings for every component the service builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunking: ChunkingOptions,
    pub retrieval: RetrievalConfig,
    pub answer: ComposerConfig,
}

/// Outcome of [`RagService::add_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub embedded: usize,
    /// Chunks stored without a vector because embedding failed.
    pub pending: usize,
    /// Whether an existing document with the same id was replaced.
    pub replaced: bool,
}

/// Outcome of [`RagService::embed_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub embedded: usize,
    pub failed: usize,
    /// Chunks dropped or rewritten by a concurrent mutation.
    pub skipped: usize,
}

type DocLock = Arc<tokio::sync::Mutex<()>>;

pub struct RagService {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingGateway>,
    retriever: Arc<Retriever>,
    composer: AnswerComposer,
    chunking: ChunkingOptions,
    locks: parking_lot::Mutex<HashMap<String, DocLock>>,
}

impl RagService {
    /// # Errors
    ///
    /// [`RagError::InvalidConfiguration`] if any section of `config` is
    /// out of range.
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingGateway>,
        completer: Arc<dyn CompletionGateway>,
        config: RagConfig,
    ) -> Result<Self> {
        config.chunking.validate()?;
        let retriever = Arc::new(Retriever::new(
            store.clone(),
            embedder.clone(),
            config.retrieval,
        )?);
        let composer = AnswerComposer::new(retriever.clone(), completer, config.answer)?;

        Ok(Self {
            store,
            embedder,
            retriever,
            composer,
            chunking: config.chunking,
            locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingGateway> {
        &self.embedder
    }

    /// Chunk, embed and store a document.
    ///
    /// A document with the same id is replaced; its original creation
    /// time is kept and `updated_at` is set. Chunks whose embedding fails
    /// are stored without a vector and counted as `pending`; they can be
    /// completed later with [`embed_pending`](Self::embed_pending).
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidDocument`] for an empty title or id.
    /// - [`RagError::DimensionMismatch`] if the gateway's vectors do not
    ///   match the store. Nothing is stored in that case.
    pub async fn add_document(&self, new: NewDocument) -> Result<IngestReport> {
        if new.title.trim().is_empty() {
            return Err(RagError::InvalidDocument("title is empty".to_string()));
        }
        if matches!(&new.id, Some(id) if id.trim().is_empty()) {
            return Err(RagError::InvalidDocument("document id is empty".to_string()));
        }

        let started = Instant::now();
        let document = new.into_document();

        let doc_id = document.id.clone();
        let lock = self.lock_for(&doc_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.ingest_locked(document).await
        };
        self.release_lock(&doc_id, lock);
        let report = outcome?;

        info!(
            document_id = %report.document_id,
            chunks = report.chunks,
            embedded = report.embedded,
            pending = report.pending,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document ingested"
        );
        Ok(report)
    }

    /// Delete a document and everything derived from it. Returns `false`
    /// when the id is unknown.
    pub async fn delete_document(&self, document_id: &str) -> bool {
        let lock = self.lock_for(document_id);
        let removed = {
            let _guard = lock.lock().await;
            self.store.delete_document(document_id)
        };
        self.release_lock(document_id, lock);

        if removed {
            info!(document_id, "document deleted");
        }
        removed
    }

    /// Ranked chunks for `query`. `top_k` defaults to the configured
    /// retrieval limit.
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let k = top_k.unwrap_or(self.retriever.config().top_k);
        self.retriever.retrieve_filtered(query, filter, k).await
    }

    /// Grounded answer for `query`. See [`AnswerComposer::answer`].
    pub async fn answer(&self, query: &str, owner_filter: Option<&str>) -> Result<Answer> {
        self.composer.answer(query, owner_filter).await
    }

    /// Embed up to `limit` chunks that have no vector yet.
    ///
    /// Each document is processed under its lock. Chunks that were
    /// deleted or rewritten since they were listed are skipped.
    pub async fn embed_pending(&self, limit: Option<usize>) -> Result<EmbedReport> {
        let pending = self.store.pending_chunks(limit);
        let mut report = EmbedReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let mut by_doc: BTreeMap<String, Vec<DocumentChunk>> = BTreeMap::new();
        for c in pending {
            by_doc.entry(c.document_id.clone()).or_default().push(c);
        }

        for (doc_id, listed) in by_doc {
            let lock = self.lock_for(&doc_id);
            let outcome = {
                let _guard = lock.lock().await;
                self.embed_document_pending(&doc_id, listed).await
            };
            self.release_lock(&doc_id, lock);

            let (embedded, failed, skipped) = outcome?;
            report.embedded += embedded;
            report.failed += failed;
            report.skipped += skipped;
        }

        info!(
            embedded = report.embedded,
            failed = report.failed,
            skipped = report.skipped,
            "pending chunks embedded"
        );
        Ok(report)
    }

    /// Drop every vector so the next [`embed_pending`](Self::embed_pending)
    /// re-embeds the whole store, e.g. after switching models.
    pub fn reset_embeddings(&self) {
        self.store.clear_vectors();
        warn!("all vectors dropped; store must be re-embedded");
    }

    /// # Errors
    ///
    /// [`RagError::DocumentNotFound`] if the id is unknown.
    pub fn get_document(&self, document_id: &str) -> Result<Document> {
        self.store
            .get_document(document_id)
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))
    }

    pub fn document_chunks(&self, document_id: &str) -> Vec<DocumentChunk> {
        self.store.document_chunks(document_id)
    }

    pub fn list_documents(&self) -> Vec<Document> {
        self.store.list_documents()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Replace the store's contents with the backend's snapshot. Returns
    /// `false` when the backend holds nothing yet.
    pub async fn load(&self, persistence: &dyn Persistence) -> Result<bool> {
        let Some(snapshot) = persistence.load().await? else {
            return Ok(false);
        };

        // A gateway reporting 0 dims (disabled) cannot embed anyway.
        if let Some(dims) = snapshot.dims {
            if self.embedder.dims() > 0 && dims != self.embedder.dims() {
                warn!(
                    stored = dims,
                    model = self.embedder.model_name(),
                    model_dims = self.embedder.dims(),
                    "stored vectors do not match the embedding model; re-embed before searching"
                );
            }
        }

        let documents = snapshot.documents.len();
        self.store.restore(snapshot)?;
        debug!(documents, "store loaded");
        Ok(true)
    }

    pub async fn save(&self, persistence: &dyn Persistence) -> Result<()> {
        let snapshot = self.store.snapshot();
        persistence.save(&snapshot).await?;
        debug!(documents = snapshot.documents.len(), "store saved");
        Ok(())
    }

    async fn ingest_locked(&self, mut document: Document) -> Result<IngestReport> {
        let previous = self.store.get_document(&document.id);
        if let Some(prev) = &previous {
            document.created_at = prev.created_at;
            document.updated_at = Some(chrono::Utc::now());
        }

        let chunks = chunk_document(&document, &self.chunking)?;
        let chunks = self.embed_chunks(chunks).await;

        let embedded = chunks.iter().filter(|c| c.has_embedding()).count();
        let report = IngestReport {
            document_id: document.id.clone(),
            chunks: chunks.len(),
            embedded,
            pending: chunks.len() - embedded,
            replaced: previous.is_some(),
        };

        self.store.insert_document(document, chunks)?;
        Ok(report)
    }

    /// Embed `chunks` concurrently and attach each vector to the chunk it
    /// was computed for. Failed chunks keep no vector.
    async fn embed_chunks(&self, chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
        let mut vectors = self.embed_by_id(&chunks).await;
        chunks
            .into_iter()
            .map(|c| match vectors.remove(&c.id) {
                Some(v) => c.with_embedding(v),
                None => c,
            })
            .collect()
    }

    /// Chunk id → vector for every chunk the gateway embedded.
    async fn embed_by_id(&self, chunks: &[DocumentChunk]) -> HashMap<String, Vec<f32>> {
        if chunks.is_empty() {
            return HashMap::new();
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let results = self.embedder.embed_batch(&texts).await;

        let mut vectors = HashMap::with_capacity(chunks.len());
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(v) => {
                    vectors.insert(chunk.id.clone(), v);
                }
                Err(e) => {
                    warn!(
                        chunk_id = %chunk.id,
                        document_id = %chunk.document_id,
                        error = %e,
                        "chunk embedding failed; left pending"
                    );
                }
            }
        }
        vectors
    }

    async fn embed_document_pending(
        &self,
        doc_id: &str,
        listed: Vec<DocumentChunk>,
    ) -> Result<(usize, usize, usize)> {
        let listed_hashes: HashMap<String, String> =
            listed.into_iter().map(|c| (c.id, c.hash)).collect();

        // Re-read under the lock: the document may have been replaced.
        let current: Vec<DocumentChunk> = self
            .store
            .document_chunks(doc_id)
            .into_iter()
            .filter(|c| !c.has_embedding())
            .filter(|c| listed_hashes.get(&c.id) == Some(&c.hash))
            .collect();

        let still_there: HashSet<&str> = current.iter().map(|c| c.id.as_str()).collect();
        let skipped = listed_hashes
            .keys()
            .filter(|id| !still_there.contains(id.as_str()))
            .count();
        if current.is_empty() {
            return Ok((0, 0, skipped));
        }

        let vectors = self.embed_by_id(&current).await;
        let failed = current.len() - vectors.len();
        let embedded = self.store.attach_vectors(doc_id, vectors.into_iter().collect())?;
        Ok((embedded, failed, skipped))
    }

    fn lock_for(&self, document_id: &str) -> DocLock {
        self.locks
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the table entry when no other task holds or awaits the lock.
    /// Handles are only cloned under the table mutex, so a count of two
    /// (table + `handle`) means nobody else can reach it.
    fn release_lock(&self, document_id: &str, handle: DocLock) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&handle) == 2 {
            locks.remove(document_id);
        }
    }
}
