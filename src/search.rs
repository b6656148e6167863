//! `gw search` and `gw ask`.

use anyhow::Result;
use serde::Serialize;

use groundwork_core::models::{Answer, DocumentType, SearchFilter, SearchResult};

use crate::app::App;
use crate::config::Config;

/// One ranked chunk, as printed by `gw search --json`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub title: String,
    pub source: String,
    pub doc_type: DocumentType,
    pub position: usize,
    pub score: f32,
    pub text: String,
}

impl From<&SearchResult> for SearchHit {
    fn from(r: &SearchResult) -> Self {
        Self {
            document_id: r.document.id.clone(),
            title: r.document.title.clone(),
            source: r.document.source.clone(),
            doc_type: r.document.doc_type,
            position: r.chunk.position,
            score: r.score,
            text: r.chunk.content.clone(),
        }
    }
}

pub async fn run_search(
    config: &Config,
    query: &str,
    filter: SearchFilter,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let app = App::open(config).await?;
    let results = app.service.search(query, &filter, limit).await?;
    app.close().await;

    let hits: Vec<SearchHit> = results.iter().map(SearchHit::from).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", i + 1, hit.score, hit.source, hit.title);
        println!("    type: {}", hit.doc_type);
        println!(
            "    excerpt: \"{}\"",
            excerpt(&hit.text, config.answer.preview_chars)
        );
        println!("    id: {} (chunk {})", hit.document_id, hit.position);
        println!();
    }
    Ok(())
}

pub async fn run_ask(config: &Config, query: &str, agent: Option<&str>, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let answer = app.service.answer(query, agent).await?;
    app.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer_text.trim());
    println!();
    if answer.degraded {
        println!("(answer generation unavailable; showing retrieved sources)");
    }
    println!("confidence: {:.2}", answer.confidence);
    if answer.sources.is_empty() {
        return;
    }
    println!("sources:");
    for (i, s) in answer.sources.iter().enumerate() {
        println!("  [{}] {} ({}) score {:.2}", i + 1, s.title, s.source, s.score);
        println!("      \"{}\"", s.preview.replace('\n', " "));
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\nb", 10), "a b");
        assert_eq!(excerpt("abcdef", 3), "abc…");
        assert_eq!(excerpt("  héllo  ", 5), "héllo");
    }
}
