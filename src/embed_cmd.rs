//! `gw embed pending` and `gw embed rebuild`.

use anyhow::{bail, Result};

use crate::app::App;
use crate::config::Config;

/// Embed chunks stored without a vector.
pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<()> {
    ensure_enabled(config)?;

    let app = App::open(config).await?;
    let before = app.service.stats();
    let report = app.service.embed_pending(limit).await?;
    if report.embedded > 0 {
        app.save().await?;
    }

    println!("embed pending");
    if before.chunks == before.embedded_chunks {
        println!("  all chunks up to date");
    } else {
        println!("  embedded: {}", report.embedded);
        println!("  failed: {}", report.failed);
        if report.skipped > 0 {
            println!("  skipped: {}", report.skipped);
        }
    }

    app.close().await;
    Ok(())
}

/// Drop every vector and re-embed the whole store.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    ensure_enabled(config)?;

    let app = App::open(config).await?;
    app.service.reset_embeddings();
    println!("embed rebuild: cleared existing embeddings");

    let report = app.service.embed_pending(None).await?;
    app.save().await?;

    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);

    app.close().await;
    Ok(())
}

fn ensure_enabled(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    Ok(())
}
