//! # Groundwork
//!
//! Retrieval-augmented answers over your own documents, from the
//! command line.
//!
//! The RAG core (chunking, vector store, retrieval, answer composition)
//! lives in the `groundwork-core` crate and has no I/O of its own. This
//! crate supplies everything around it: TOML configuration, OpenAI and
//! Ollama gateway adapters, SQLite persistence, file extraction and the
//! `gw` CLI commands.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ gw add /  │──▶│ groundwork-core          │◀─▶│  SQLite   │
//! │ ingest    │   │ chunk → embed → store    │   │ snapshot  │
//! └───────────┘   │ retrieve → compose       │   └──────────┘
//!                 └────────────┬─────────────┘
//!                              │
//!                   ┌──────────┴──────────┐
//!                   ▼                     ▼
//!            ┌─────────────┐      ┌──────────────┐
//!            │ Embeddings  │      │ Completions  │
//!            │ OpenAI/     │      │ OpenAI/      │
//!            │ Ollama/hash │      │ Ollama       │
//!            └─────────────┘      └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`app`] | Per-command context: gateways, store, persistence |
//! | [`embedding`] | Embedding gateway adapters |
//! | [`completion`] | Completion gateway adapters |
//! | [`http`] | Shared JSON POST with retry |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite snapshot persistence |
//! | [`extract`] | Text extraction from files |
//! | [`ingest`] | `gw add` / `gw ingest` |
//! | [`get`] | `gw get` / `gw list` / `gw delete` |
//! | [`search`] | `gw search` / `gw ask` |
//! | [`embed_cmd`] | `gw embed pending` / `gw embed rebuild` |
//! | [`stats`] | `gw stats` |

pub mod app;
pub mod completion;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
