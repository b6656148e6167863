//! Document lookup and removal: `gw get`, `gw list`, `gw delete`.

use anyhow::Result;
use serde::Serialize;

use groundwork_core::models::{Document, DocumentChunk};

use crate::app::App;
use crate::config::Config;

/// A document with its chunks, as printed by `gw get --json`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub chunks: Vec<ChunkView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkView {
    pub id: String,
    pub position: usize,
    pub text: String,
    pub embedded: bool,
}

impl From<&DocumentChunk> for ChunkView {
    fn from(c: &DocumentChunk) -> Self {
        Self {
            id: c.id.clone(),
            position: c.position,
            text: c.content.clone(),
            embedded: c.has_embedding(),
        }
    }
}

pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let document = app.service.get_document(id)?;
    let chunks: Vec<ChunkView> = app
        .service
        .document_chunks(id)
        .iter()
        .map(ChunkView::from)
        .collect();
    app.close().await;

    let view = DocumentView { document, chunks };
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let doc = &view.document;
    println!("--- Document ---");
    println!("id: {}", doc.id);
    println!("title: {}", doc.title);
    println!("type: {}", doc.doc_type);
    println!("source: {}", doc.source);
    if let Some(agent) = &doc.tags.agent_id {
        println!("agent: {}", agent);
    }
    if let Some(industry) = &doc.tags.industry {
        println!("industry: {}", industry);
    }
    println!("created: {}", doc.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(updated) = doc.updated_at {
        println!("updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
    for (k, v) in &doc.metadata {
        println!("meta.{}: {}", k, v);
    }
    println!();
    println!("--- Content ---");
    println!("{}", doc.content);
    println!();
    println!("--- Chunks ({}) ---", view.chunks.len());
    for c in &view.chunks {
        let marker = if c.embedded { "" } else { " (pending)" };
        println!("[{}]{} {}", c.position, marker, c.text);
    }

    Ok(())
}

pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let docs = app.service.list_documents();
    let counts: Vec<usize> = docs
        .iter()
        .map(|d| app.service.document_chunks(&d.id).len())
        .collect();
    app.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<14}  {:>6}  {:<12}  TITLE",
        "ID", "TYPE", "CHUNKS", "AGENT"
    );
    for (doc, chunks) in docs.iter().zip(counts) {
        println!(
            "{:<36}  {:<14}  {:>6}  {:<12}  {}",
            doc.id,
            doc.doc_type.as_str(),
            chunks,
            doc.tags.agent_id.as_deref().unwrap_or("-"),
            doc.title
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let removed = app.service.delete_document(id).await;
    if removed {
        app.save().await?;
        println!("Deleted {}", id);
    } else {
        println!("No document with id {}", id);
    }
    app.close().await;
    Ok(())
}
