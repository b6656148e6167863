//! Per-invocation application context.
//!
//! Every `gw` command follows the same lifecycle: open the database,
//! build the gateways named in the config, restore the in-memory store
//! from the last snapshot, run, and save again if the store changed.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use groundwork_core::store::VectorStore;
use groundwork_core::RagService;

use crate::completion::create_completer;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqlitePersistence;

pub struct App {
    pub config: Config,
    pub service: RagService,
    persistence: SqlitePersistence,
    pool: SqlitePool,
}

impl App {
    /// Connect, migrate and load the stored snapshot.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.completion)?;
        let store = Arc::new(VectorStore::new());
        let service = RagService::new(store, embedder, completer, config.rag_config())
            .context("Invalid retrieval settings")?;

        let persistence = SqlitePersistence::new(pool.clone());
        let loaded = service
            .load(&persistence)
            .await
            .context("Failed to load stored documents")?;
        debug!(loaded, db = %config.db.path.display(), "store opened");

        Ok(Self {
            config: config.clone(),
            service,
            persistence,
            pool,
        })
    }

    /// Write the store back to SQLite.
    pub async fn save(&self) -> Result<()> {
        self.service
            .save(&self.persistence)
            .await
            .context("Failed to save store")?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbConfig, EmbeddingConfig};
    use groundwork_core::models::{NewDocument, SearchFilter};

    fn config(dir: &tempfile::TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("data/gw.sqlite"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: EmbeddingConfig {
                provider: "hashing".to_string(),
                dims: Some(256),
                ..Default::default()
            },
            completion: Default::default(),
            answer: Default::default(),
            logging: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = config(&dir);

        let app = App::open(&cfg).await.unwrap();
        app.service
            .add_document(
                NewDocument::new("Returns Policy", "Items may be returned within 30 days.")
                    .with_id("returns"),
            )
            .await
            .unwrap();
        app.save().await.unwrap();
        let before = app
            .service
            .search("returned within 30 days", &SearchFilter::default(), Some(3))
            .await
            .unwrap();
        app.close().await;

        let reopened = App::open(&cfg).await.unwrap();
        let stats = reopened.service.stats();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.embedded_chunks, 1);
        assert_eq!(stats.dims, Some(256));

        let after = reopened
            .service
            .search("returned within 30 days", &SearchFilter::default(), Some(3))
            .await
            .unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].chunk.id, after[0].chunk.id);
        assert!((before[0].score - after[0].score).abs() < 1e-6);
        reopened.close().await;
    }
}
