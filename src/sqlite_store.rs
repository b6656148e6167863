//! SQLite-backed [`Persistence`] for the in-memory vector store.
//!
//! The store is saved as a whole: [`save`](SqlitePersistence::save)
//! rewrites every table inside one transaction, so a crash mid-save
//! leaves the previous snapshot intact. Vectors are stored as
//! little-endian `f32` BLOBs (see [`vec_to_blob`]).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};

use groundwork_core::embedding::{blob_to_vec, vec_to_blob};
use groundwork_core::models::{ChunkMetadata, Document, DocumentChunk, DocumentTags};
use groundwork_core::store::{Persistence, StoreSnapshot};
use groundwork_core::RagError;

const DIMS_KEY: &str = "dims";

pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Wrap a pool whose schema was created by
    /// [`run_migrations`](crate::migrate::run_migrations).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_snapshot(&self) -> Result<Option<StoreSnapshot>> {
        let dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&self.pool)
                .await?;
        let dims = dims
            .map(|d| d.parse::<usize>())
            .transpose()
            .context("store_meta.dims is not a number")?;

        let doc_rows = sqlx::query(
            "SELECT id, title, body, doc_type, source, agent_id, industry, metadata_json, \
             created_at, updated_at FROM documents ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        if doc_rows.is_empty() && dims.is_none() {
            return Ok(None);
        }

        let mut documents = Vec::with_capacity(doc_rows.len());
        for row in &doc_rows {
            let doc_type: String = row.get("doc_type");
            let metadata_json: String = row.get("metadata_json");
            let created_at: String = row.get("created_at");
            let updated_at: Option<String> = row.get("updated_at");

            documents.push(Document {
                id: row.get("id"),
                title: row.get("title"),
                content: row.get("body"),
                doc_type: doc_type.parse()?,
                source: row.get("source"),
                tags: DocumentTags {
                    agent_id: row.get("agent_id"),
                    industry: row.get("industry"),
                },
                metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
                    .context("documents.metadata_json is not a string map")?,
                created_at: parse_ts(&created_at)?,
                updated_at: updated_at.as_deref().map(parse_ts).transpose()?,
            });
        }

        let by_id: HashMap<&str, &Document> =
            documents.iter().map(|d| (d.id.as_str(), d)).collect();

        let chunk_rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.position, c.text, c.hash, v.embedding
            FROM chunks c
            LEFT JOIN chunk_vectors v ON v.chunk_id = c.id
            ORDER BY c.document_id, c.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(chunk_rows.len());
        for row in &chunk_rows {
            let document_id: String = row.get("document_id");
            let parent = by_id
                .get(document_id.as_str())
                .ok_or_else(|| anyhow!("chunk references missing document {}", document_id))?;
            let position: i64 = row.get("position");
            let embedding: Option<Vec<u8>> = row.get("embedding");

            chunks.push(DocumentChunk {
                id: row.get("id"),
                document_id,
                content: row.get("text"),
                position: position as usize,
                embedding: embedding.as_deref().map(blob_to_vec),
                hash: row.get("hash"),
                metadata: ChunkMetadata::from(*parent),
            });
        }

        Ok(Some(StoreSnapshot {
            dims,
            documents,
            chunks,
        }))
    }

    async fn save_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM store_meta")
            .execute(&mut *tx)
            .await?;

        if let Some(dims) = snapshot.dims {
            sqlx::query("INSERT INTO store_meta (key, value) VALUES (?, ?)")
                .bind(DIMS_KEY)
                .bind(dims.to_string())
                .execute(&mut *tx)
                .await?;
        }

        for doc in &snapshot.documents {
            sqlx::query(
                r#"
                INSERT INTO documents (id, title, body, doc_type, source, agent_id, industry,
                                       metadata_json, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(doc.doc_type.as_str())
            .bind(&doc.source)
            .bind(&doc.tags.agent_id)
            .bind(&doc.tags.industry)
            .bind(serde_json::to_string(&doc.metadata)?)
            .bind(format_ts(&doc.created_at))
            .bind(doc.updated_at.as_ref().map(format_ts))
            .execute(&mut *tx)
            .await?;
        }

        for chunk in &snapshot.chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, position, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.position as i64)
            .bind(&chunk.content)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            if let Some(vector) = &chunk.embedding {
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, dims, embedding) VALUES (?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(vector.len() as i64)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}

fn persistence_error(e: anyhow::Error) -> RagError {
    RagError::Persistence(format!("{:#}", e))
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn load(&self) -> groundwork_core::Result<Option<StoreSnapshot>> {
        self.load_snapshot().await.map_err(persistence_error)
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> groundwork_core::Result<()> {
        self.save_snapshot(snapshot).await.map_err(persistence_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_core::models::{DocumentType, NewDocument};

    async fn persistence() -> (tempfile::TempDir, SqlitePersistence) {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect(&dir.path().join("gw.sqlite")).await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (dir, SqlitePersistence::new(pool))
    }

    fn snapshot() -> StoreSnapshot {
        let doc = NewDocument::new("Returns Policy", "Items may be returned within 30 days.")
            .with_id("returns")
            .with_type(DocumentType::Faq)
            .with_agent("agent-a")
            .with_metadata("lang", "en")
            .into_document();
        let plain = NewDocument::new("Hours", "Open 9 to 5.")
            .with_id("hours")
            .into_document();

        let chunks = vec![
            DocumentChunk::new(&doc, 0, "Items may be returned").with_embedding(vec![0.5, -1.0, 2.0]),
            DocumentChunk::new(&doc, 1, "within 30 days."),
            DocumentChunk::new(&plain, 0, "Open 9 to 5.").with_embedding(vec![1.0, 0.0, 0.0]),
        ];

        StoreSnapshot {
            dims: Some(3),
            documents: vec![doc, plain],
            chunks,
        }
    }

    #[tokio::test]
    async fn test_empty_database_loads_none() {
        let (_dir, p) = persistence().await;
        assert!(p.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_contents() {
        let (_dir, p) = persistence().await;
        let original = snapshot();
        p.save(&original).await.unwrap();

        let loaded = p.load().await.unwrap().unwrap();
        assert_eq!(loaded.dims, Some(3));

        let mut expected_docs = original.documents.clone();
        let mut got_docs = loaded.documents.clone();
        expected_docs.sort_by(|a, b| a.id.cmp(&b.id));
        got_docs.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(got_docs, expected_docs);

        let mut expected_chunks = original.chunks.clone();
        expected_chunks.sort_by(|a, b| (&a.document_id, a.position).cmp(&(&b.document_id, b.position)));
        assert_eq!(loaded.chunks, expected_chunks);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let (_dir, p) = persistence().await;
        p.save(&snapshot()).await.unwrap();

        p.save(&StoreSnapshot {
            dims: None,
            documents: vec![],
            chunks: vec![],
        })
        .await
        .unwrap();

        assert!(p.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dims_survive_without_documents() {
        let (_dir, p) = persistence().await;
        p.save(&StoreSnapshot {
            dims: Some(8),
            ..Default::default()
        })
        .await
        .unwrap();

        let loaded = p.load().await.unwrap().unwrap();
        assert_eq!(loaded.dims, Some(8));
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_row_is_persistence_error() {
        let (_dir, p) = persistence().await;
        p.save(&snapshot()).await.unwrap();
        sqlx::query("UPDATE documents SET doc_type = 'spreadsheet'")
            .execute(&p.pool)
            .await
            .unwrap();

        let err = p.load().await.unwrap_err();
        assert!(matches!(err, RagError::Persistence(_)));
    }
}
