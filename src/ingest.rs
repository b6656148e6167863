//! File ingestion: `gw add` for one file, `gw ingest` for a directory.
//!
//! Each file is extracted, handed to the service (chunk, embed, insert)
//! and the store is saved once at the end. Directory ingestion uses the
//! path relative to the root as document id, so re-running it replaces
//! documents instead of duplicating them. Embedding failures leave
//! chunks pending and do not fail the command.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use groundwork_core::models::{DocumentTags, DocumentType, NewDocument};

use crate::app::App;
use crate::config::Config;
use crate::extract;

/// Globs matched when `gw ingest` is given none.
pub const DEFAULT_INCLUDE_GLOBS: [&str; 3] = ["**/*.md", "**/*.txt", "**/*.pdf"];

const DEFAULT_EXCLUDE_GLOBS: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Overrides for `gw add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub id: Option<String>,
    pub title: Option<String>,
    pub doc_type: Option<DocumentType>,
    pub source: Option<String>,
    pub agent: Option<String>,
    pub industry: Option<String>,
    pub metadata: Vec<(String, String)>,
}

pub async fn run_add(config: &Config, path: &Path, opts: AddOptions) -> Result<()> {
    let file = extract::read_file(path)?;

    let mut doc = NewDocument::new(
        opts.title.unwrap_or_else(|| default_title(path)),
        file.text,
    )
    .with_type(opts.doc_type.unwrap_or(file.doc_type))
    .with_source(opts.source.unwrap_or_else(|| path.display().to_string()));
    doc.id = opts.id;
    doc.tags = DocumentTags {
        agent_id: opts.agent,
        industry: opts.industry,
    };
    doc.metadata = opts.metadata.into_iter().collect::<BTreeMap<_, _>>();

    let app = App::open(config).await?;
    let report = app.service.add_document(doc).await?;
    app.save().await?;

    println!("add {}", path.display());
    println!("  id: {}", report.document_id);
    if report.replaced {
        println!("  replaced existing document");
    }
    println!("  chunks: {}", report.chunks);
    if config.embedding.is_enabled() {
        println!("  embedded: {}", report.embedded);
        println!("  pending: {}", report.pending);
    }
    println!("ok");

    app.close().await;
    Ok(())
}

pub async fn run_ingest(
    config: &Config,
    root: &Path,
    globs: Vec<String>,
    agent: Option<String>,
    industry: Option<String>,
) -> Result<()> {
    let globs = if globs.is_empty() {
        DEFAULT_INCLUDE_GLOBS.iter().map(|g| g.to_string()).collect()
    } else {
        globs
    };
    let files = scan_files(root, &globs)?;

    let app = App::open(config).await?;
    let mut documents = 0usize;
    let mut replaced = 0usize;
    let mut chunks = 0usize;
    let mut embedded = 0usize;
    let mut pending = 0usize;
    let mut skipped = 0usize;

    for (path, relative) in &files {
        let file = match extract::read_file(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(file = %relative, error = %e, "skipping file");
                skipped += 1;
                continue;
            }
        };

        let mut doc = NewDocument::new(default_title(path), file.text)
            .with_id(relative.clone())
            .with_type(file.doc_type)
            .with_source(relative.clone());
        doc.tags = DocumentTags {
            agent_id: agent.clone(),
            industry: industry.clone(),
        };

        let report = app
            .service
            .add_document(doc)
            .await
            .with_context(|| format!("Failed to ingest {}", relative))?;
        documents += 1;
        replaced += usize::from(report.replaced);
        chunks += report.chunks;
        embedded += report.embedded;
        pending += report.pending;
    }

    app.save().await?;

    println!("ingest {}", root.display());
    println!("  files found: {}", files.len());
    println!("  documents: {} ({} replaced)", documents, replaced);
    println!("  chunks written: {}", chunks);
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", embedded);
        println!("  embeddings pending: {}", pending);
    }
    if skipped > 0 {
        println!("  skipped: {}", skipped);
    }
    println!("ok");

    app.close().await;
    Ok(())
}

/// Files under `root` matching `include_globs`, as (path, relative path)
/// pairs sorted by relative path. VCS and build directories are skipped.
pub fn scan_files(root: &Path, include_globs: &[String]) -> Result<Vec<(PathBuf, String)>> {
    if !root.is_dir() {
        bail!("Ingest root is not a directory: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(&DEFAULT_EXCLUDE_GLOBS.map(String::from))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "untitled".to_string())
}
