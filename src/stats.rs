//! Store statistics: `gw stats`.
//!
//! A quick answer to "is everything embedded?": document and chunk
//! counts, embedding coverage, the stored vector dimensionality, and a
//! per-type breakdown.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::app::App;
use crate::config::Config;

pub async fn run_stats(config: &Config) -> Result<()> {
    let app = App::open(config).await?;
    let stats = app.service.stats();

    let mut by_type: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for doc in app.service.list_documents() {
        let entry = by_type.entry(doc.doc_type.as_str()).or_default();
        entry.0 += 1;
        entry.1 += app.service.document_chunks(&doc.id).len();
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Groundwork Store Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Embedding:   {} ({})",
        app.service.embedder().model_name(),
        stats
            .dims
            .map(|d| format!("{} dims", d))
            .unwrap_or_else(|| "no vectors".to_string())
    );
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded_chunks,
        stats.chunks,
        if stats.chunks > 0 {
            (stats.embedded_chunks * 100) / stats.chunks
        } else {
            0
        }
    );

    if !by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<16} {:>6} {:>8}", "TYPE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(32));
        for (doc_type, (docs, chunks)) in &by_type {
            println!("  {:<16} {:>6} {:>8}", doc_type, docs, chunks);
        }
    }
    println!();

    app.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
