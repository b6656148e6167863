//! In-memory [`VectorStore`].
//!
//! Documents and chunks live in `HashMap`s; vectors live in a separate
//! insertion-ordered table so similarity scans touch only numeric data.
//! Everything sits behind one `parking_lot::RwLock`: mutations hold the
//! write lock for their whole duration, searches share the read lock.
//! Vector search is a brute-force cosine scan, O(n·d) per query.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Document, DocumentChunk, SearchResult};

use super::{StoreSnapshot, StoreStats};

struct StoredVector {
    chunk_id: String,
    document_id: String,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    dims: Option<usize>,
    documents: HashMap<String, Document>,
    /// Chunk content without vectors.
    chunks: HashMap<String, DocumentChunk>,
    /// Document id → chunk ids in position order.
    doc_chunks: HashMap<String, Vec<String>>,
    vectors: Vec<StoredVector>,
    /// Chunk id → position in `vectors`.
    vector_index: HashMap<String, usize>,
}

impl Inner {
    fn check_dims(&self, pending: Option<usize>, vector: &[f32]) -> Result<usize> {
        if vector.is_empty() {
            return Err(RagError::InvalidDocument("empty vector".to_string()));
        }
        match self.dims.or(pending) {
            Some(expected) if expected != vector.len() => Err(RagError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(vector.len()),
        }
    }

    fn push_vector(&mut self, stored: StoredVector) {
        match self.vector_index.get(&stored.chunk_id) {
            Some(&at) => self.vectors[at] = stored,
            None => {
                self.vector_index
                    .insert(stored.chunk_id.clone(), self.vectors.len());
                self.vectors.push(stored);
            }
        }
    }

    /// Drop vectors rejected by `keep` and rebuild the index in one pass.
    fn retain_vectors<F>(&mut self, keep: F)
    where
        F: Fn(&StoredVector) -> bool,
    {
        self.vectors.retain(|v| keep(v));
        self.vector_index = self
            .vectors
            .iter()
            .enumerate()
            .map(|(at, v)| (v.chunk_id.clone(), at))
            .collect();
    }

    /// Validate everything first, then mutate. Nothing changes on error.
    fn insert(&mut self, document: Document, chunks: Vec<DocumentChunk>) -> Result<()> {
        if document.id.trim().is_empty() {
            return Err(RagError::InvalidDocument("document id is empty".to_string()));
        }

        let mut seen_ids = HashSet::new();
        let mut seen_positions = HashSet::new();
        let mut batch_dims = None;

        for c in &chunks {
            if c.document_id != document.id {
                return Err(RagError::InvalidDocument(format!(
                    "chunk {} belongs to document {}, not {}",
                    c.id, c.document_id, document.id
                )));
            }
            if c.content.trim().is_empty() {
                return Err(RagError::InvalidDocument(format!(
                    "chunk {} of document {} has empty content",
                    c.position, document.id
                )));
            }
            if !seen_ids.insert(c.id.as_str()) || !seen_positions.insert(c.position) {
                return Err(RagError::InvalidDocument(format!(
                    "duplicate chunk {} at position {} in document {}",
                    c.id, c.position, document.id
                )));
            }
            if let Some(v) = &c.embedding {
                batch_dims = Some(self.check_dims(batch_dims, v)?);
            }
        }

        self.remove(&document.id);

        if self.dims.is_none() {
            self.dims = batch_dims;
        }

        let mut ordered = chunks;
        ordered.sort_by_key(|c| c.position);

        let doc_id = document.id.clone();
        let mut ids = Vec::with_capacity(ordered.len());
        for mut c in ordered {
            if let Some(vector) = c.embedding.take() {
                self.push_vector(StoredVector {
                    chunk_id: c.id.clone(),
                    document_id: doc_id.clone(),
                    vector,
                });
            }
            ids.push(c.id.clone());
            self.chunks.insert(c.id.clone(), c);
        }
        self.doc_chunks.insert(doc_id.clone(), ids);
        self.documents.insert(doc_id, document);
        Ok(())
    }

    fn remove(&mut self, document_id: &str) -> bool {
        if self.documents.remove(document_id).is_none() {
            return false;
        }
        if let Some(ids) = self.doc_chunks.remove(document_id) {
            for id in ids {
                self.chunks.remove(&id);
            }
        }
        self.retain_vectors(|v| v.document_id != document_id);
        true
    }

    fn vector_of(&self, chunk_id: &str) -> Option<&Vec<f32>> {
        self.vector_index
            .get(chunk_id)
            .and_then(|&at| self.vectors.get(at))
            .map(|v| &v.vector)
    }

    fn chunks_of(&self, document_id: &str) -> Vec<DocumentChunk> {
        self.doc_chunks
            .get(document_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.chunks.get(id))
                    .map(|c| {
                        let mut c = c.clone();
                        c.embedding = self.vector_of(&c.id).cloned();
                        c
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sorted_documents(&self) -> Vec<&Document> {
        let mut docs: Vec<&Document> = self.documents.values().collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        docs
    }
}

/// Process-local index of documents, chunks and vectors.
///
/// Construct one per process (or per test) and share it behind an
/// `Arc`. The store never suspends: every method is synchronous.
///
/// # Invariants
///
/// - Every vector belongs to a stored chunk, and every chunk to a stored
///   document.
/// - All vectors share one dimensionality, fixed at construction with
///   [`with_dimensions`](Self::with_dimensions) or by the first vector
///   accepted.
pub struct VectorStore {
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Empty store whose dimensionality is fixed by the first vector.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Empty store that only accepts `dims`-dimensional vectors.
    pub fn with_dimensions(dims: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                dims: Some(dims),
                ..Inner::default()
            }),
        }
    }

    /// The dimensionality every stored vector shares, once known.
    pub fn dims(&self) -> Option<usize> {
        self.inner.read().dims
    }

    /// Add a document with its chunks, atomically.
    ///
    /// Chunks may carry a vector in [`DocumentChunk::embedding`]; chunks
    /// without one are stored as pending. A document already stored under
    /// the same id is replaced (its chunks and vectors are dropped first).
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if any vector's length differs
    ///   from the store's or from the other vectors in the batch.
    /// - [`RagError::InvalidDocument`] for an empty document id, empty
    ///   chunk content, a chunk of another document, or duplicate chunk
    ///   ids or positions.
    ///
    /// On error the store is unchanged.
    pub fn insert_document(&self, document: Document, chunks: Vec<DocumentChunk>) -> Result<()> {
        let doc_id = document.id.clone();
        let count = chunks.len();
        self.inner.write().insert(document, chunks)?;
        debug!(document_id = %doc_id, chunks = count, "document inserted");
        Ok(())
    }

    /// Remove a document with all its chunks and vectors.
    ///
    /// Returns `false` (not an error) when the id is unknown.
    pub fn delete_document(&self, document_id: &str) -> bool {
        let removed = self.inner.write().remove(document_id);
        if removed {
            debug!(document_id, "document deleted");
        }
        removed
    }

    /// Attach vectors to chunks of a stored document, atomically.
    ///
    /// Replaces any vector the chunk already had. Returns the number of
    /// vectors written.
    ///
    /// # Errors
    ///
    /// - [`RagError::DocumentNotFound`] if the document is gone.
    /// - [`RagError::InvalidDocument`] if a chunk id is not one of the
    ///   document's chunks.
    /// - [`RagError::DimensionMismatch`] as for
    ///   [`insert_document`](Self::insert_document).
    pub fn attach_vectors(&self, document_id: &str, vectors: Vec<(String, Vec<f32>)>) -> Result<usize> {
        let mut inner = self.inner.write();

        let owned: HashSet<&String> = match inner.doc_chunks.get(document_id) {
            Some(ids) => ids.iter().collect(),
            None => return Err(RagError::DocumentNotFound(document_id.to_string())),
        };

        let mut batch_dims = None;
        for (chunk_id, vector) in &vectors {
            if !owned.contains(chunk_id) {
                return Err(RagError::InvalidDocument(format!(
                    "chunk {} is not part of document {}",
                    chunk_id, document_id
                )));
            }
            batch_dims = Some(inner.check_dims(batch_dims, vector)?);
        }

        if inner.dims.is_none() {
            inner.dims = batch_dims;
        }

        let written = vectors.len();
        let replaced: HashSet<String> = vectors
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| inner.vector_index.contains_key(id))
            .collect();
        if !replaced.is_empty() {
            inner.retain_vectors(|v| !replaced.contains(&v.chunk_id));
        }
        for (chunk_id, vector) in vectors {
            inner.push_vector(StoredVector {
                chunk_id,
                document_id: document_id.to_string(),
                vector,
            });
        }
        Ok(written)
    }

    /// Remove everything. The dimensionality set at construction, or by
    /// the first accepted vector, is kept.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let dims = inner.dims;
        *inner = Inner {
            dims,
            ..Inner::default()
        };
    }

    /// Drop every vector and forget the dimensionality, keeping documents
    /// and chunks. Used before re-embedding with a different model.
    pub fn clear_vectors(&self) {
        let mut inner = self.inner.write();
        inner.vectors.clear();
        inner.vector_index.clear();
        inner.dims = None;
    }

    /// Find the chunks most similar to `query`.
    ///
    /// Chunks rejected by `filter` are skipped before scoring. The rest
    /// are scored by cosine similarity, those below `similarity_threshold`
    /// are dropped, and the remainder is sorted by descending score,
    /// keeping insertion order among equal scores. At most `top_k`
    /// results are returned. Chunks without a vector never match.
    ///
    /// Returned chunks do not carry their vector.
    ///
    /// # Errors
    ///
    /// [`RagError::DimensionMismatch`] if `query` does not have the
    /// store's dimensionality.
    pub fn search<F>(
        &self,
        query: &[f32],
        top_k: usize,
        similarity_threshold: f32,
        filter: F,
    ) -> Result<Vec<SearchResult>>
    where
        F: Fn(&DocumentChunk) -> bool,
    {
        let started = Instant::now();
        let inner = self.inner.read();

        if let Some(expected) = inner.dims {
            if query.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if top_k == 0 || inner.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(&StoredVector, &DocumentChunk, f32)> = inner
            .vectors
            .iter()
            .filter_map(|sv| {
                let chunk = inner.chunks.get(&sv.chunk_id)?;
                if !filter(chunk) {
                    return None;
                }
                let score = cosine_similarity(query, &sv.vector);
                (score >= similarity_threshold).then_some((sv, chunk, score))
            })
            .collect();

        // `sort_by` is stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let results: Vec<SearchResult> = scored
            .into_iter()
            .filter_map(|(sv, chunk, score)| {
                let document = inner.documents.get(&sv.document_id)?;
                Some(SearchResult {
                    chunk: chunk.clone(),
                    document: document.clone(),
                    score,
                })
            })
            .collect();

        debug!(
            scanned = inner.vectors.len(),
            returned = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "vector search"
        );
        Ok(results)
    }

    pub fn get_document(&self, document_id: &str) -> Option<Document> {
        self.inner.read().documents.get(document_id).cloned()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.inner.read().documents.contains_key(document_id)
    }

    /// Chunks of a document in position order, with their vectors.
    pub fn document_chunks(&self, document_id: &str) -> Vec<DocumentChunk> {
        self.inner.read().chunks_of(document_id)
    }

    /// All documents, oldest first (ties broken by id).
    pub fn list_documents(&self) -> Vec<Document> {
        self.inner
            .read()
            .sorted_documents()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Chunks that have no vector yet, in document then position order.
    pub fn pending_chunks(&self, limit: Option<usize>) -> Vec<DocumentChunk> {
        let inner = self.inner.read();
        let embedded: HashSet<&str> = inner.vectors.iter().map(|v| v.chunk_id.as_str()).collect();

        inner
            .sorted_documents()
            .into_iter()
            .filter_map(|d| inner.doc_chunks.get(&d.id))
            .flatten()
            .filter(|id| !embedded.contains(id.as_str()))
            .filter_map(|id| inner.chunks.get(id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            documents: inner.documents.len(),
            chunks: inner.chunks.len(),
            embedded_chunks: inner.vectors.len(),
            dims: inner.dims,
        }
    }

    /// Copy the whole store.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        let documents: Vec<Document> = inner.sorted_documents().into_iter().cloned().collect();
        let chunks = documents
            .iter()
            .flat_map(|d| inner.chunks_of(&d.id))
            .collect();

        StoreSnapshot {
            dims: inner.dims,
            documents,
            chunks,
        }
    }

    /// Replace the store's contents with `snapshot`, atomically.
    ///
    /// # Errors
    ///
    /// Any insert error for a snapshot document, or
    /// [`RagError::InvalidDocument`] for a chunk whose document is not in
    /// the snapshot. On error the store is unchanged.
    pub fn restore(&self, snapshot: StoreSnapshot) -> Result<()> {
        let mut fresh = Inner {
            dims: snapshot.dims,
            ..Inner::default()
        };

        let mut by_doc: HashMap<String, Vec<DocumentChunk>> = HashMap::new();
        for c in snapshot.chunks {
            by_doc.entry(c.document_id.clone()).or_default().push(c);
        }

        for doc in snapshot.documents {
            let chunks = by_doc.remove(&doc.id).unwrap_or_default();
            fresh.insert(doc, chunks)?;
        }

        if let Some(orphan) = by_doc.keys().next() {
            return Err(RagError::InvalidDocument(format!(
                "snapshot has chunks for missing document {}",
                orphan
            )));
        }

        *self.inner.write() = fresh;
        Ok(())
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}
