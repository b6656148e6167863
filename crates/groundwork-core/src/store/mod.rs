//! Vector storage and its persistence boundary.
//!
//! [`VectorStore`] is the in-memory, process-local index of documents,
//! chunks and chunk vectors that every search runs against. Durability
//! is a pluggable collaborator: a [`Persistence`] backend exchanges whole
//! [`StoreSnapshot`]s with the store and never participates in search,
//! so the store's invariants hold with or without one attached.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Document, DocumentChunk};

pub use memory::VectorStore;

/// Serializable copy of a store's contents.
///
/// Chunks carry their vector in [`DocumentChunk::embedding`]; chunks
/// without one are pending embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Dimensionality fixed by the store, if any vector was ever accepted
    /// or the store was built with one.
    pub dims: Option<usize>,
    pub documents: Vec<Document>,
    pub chunks: Vec<DocumentChunk>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.chunks.is_empty()
    }
}

/// Counts describing a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub dims: Option<usize>,
}

/// Durable backing for a [`VectorStore`].
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](Persistence::load) | Read the last saved snapshot, if any |
/// | [`save`](Persistence::save) | Replace the stored snapshot atomically |
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the stored snapshot. `Ok(None)` means nothing was saved yet.
    async fn load(&self) -> Result<Option<StoreSnapshot>>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;
}
