//! # Groundwork Core
//!
//! The retrieval-augmented-generation core of Groundwork: data models,
//! chunking, the in-memory vector store, retrieval, grounded answer
//! composition, and the gateway traits that connect them to embedding
//! and completion providers.
//!
//! This crate contains no network clients, sqlx, or filesystem I/O.
//! Providers and persistence backends are supplied by the caller through
//! [`embedding::EmbeddingGateway`], [`completion::CompletionGateway`] and
//! [`store::Persistence`], so everything here runs in tests without a
//! network stack.
//!
//! ```text
//! Document ─▶ chunk ─▶ EmbeddingGateway ─▶ VectorStore
//! Query ─▶ EmbeddingGateway ─▶ Retriever ─▶ AnswerComposer ─▶ CompletionGateway
//! ```

pub mod answer;
pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod service;
pub mod store;

pub use error::{RagError, Result};
pub use service::{EmbedReport, IngestReport, RagConfig, RagService};
