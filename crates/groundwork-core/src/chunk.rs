//! Document chunker.
//!
//! Splits a document's content into [`DocumentChunk`]s under one of three
//! strategies. Lengths are counted in characters (Unicode scalar values),
//! never bytes, so multi-byte text is never cut inside a code point.
//!
//! Each chunk receives a deterministic id derived from its document id
//! and position, plus a SHA-256 hash of its text for staleness detection
//! in the embedding pipeline.
//!
//! # Fixed-size algorithm
//!
//! 1. Take a window of `chunk_size` characters starting at `start`.
//! 2. If the window does not reach the end of the text, search backward
//!    from the window end for the last whitespace. Cut there when it lies
//!    past 80% of `chunk_size` from the window start; otherwise hard-cut
//!    at the window end.
//! 3. The next window starts `overlap` characters before the cut, moved
//!    forward to just after the first whitespace inside the overlap
//!    region so the next chunk never begins with a clipped word. With no
//!    whitespace in the region, the next window starts at the cut.
//! 4. Stop once the window reaches the end of the text. The start always
//!    advances, even when `overlap >= chunk_size`.
//!
//! # Example
//!
//! ```rust
//! use groundwork_core::chunk::{chunk, ChunkingStrategy};
//! use groundwork_core::models::NewDocument;
//!
//! let doc = NewDocument::new(
//!     "Returns Policy",
//!     "Items may be returned within 30 days. Exchanges are accepted within 14 days.",
//! )
//! .with_id("returns")
//! .into_document();
//!
//! let chunks = chunk(&doc, ChunkingStrategy::FixedSize, 40, 5).unwrap();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].content, "Items may be returned within 30 days.");
//! assert_eq!(chunks[1].content, "Exchanges are accepted within 14 days.");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RagError, Result};
use crate::models::{Document, DocumentChunk};

/// Fraction of `chunk_size` a whitespace cut must lie beyond.
const BOUNDARY_RATIO: f64 = 0.8;

/// Paragraphs shorter than this are dropped by default (stray headers,
/// page numbers, separators).
pub const DEFAULT_MIN_PARAGRAPH_CHARS: usize = 20;

/// How content is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    #[default]
    FixedSize,
    Paragraph,
    Sentence,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::FixedSize => "fixed_size",
            ChunkingStrategy::Paragraph => "paragraph",
            ChunkingStrategy::Sentence => "sentence",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed_size" | "fixed" => Ok(ChunkingStrategy::FixedSize),
            "paragraph" => Ok(ChunkingStrategy::Paragraph),
            "sentence" => Ok(ChunkingStrategy::Sentence),
            other => Err(RagError::InvalidConfiguration(format!(
                "unknown chunking strategy '{}': expected fixed_size, paragraph, or sentence",
                other
            ))),
        }
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub strategy: ChunkingStrategy,
    /// Target chunk length in characters. Must be > 0.
    pub chunk_size: usize,
    /// Characters shared between consecutive fixed-size chunks.
    pub overlap: usize,
    /// Minimum paragraph length kept by the paragraph strategy.
    pub min_paragraph_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::FixedSize,
            chunk_size: 1000,
            overlap: 200,
            min_paragraph_chars: DEFAULT_MIN_PARAGRAPH_CHARS,
        }
    }
}

impl ChunkingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a document using `strategy` with default paragraph settings.
pub fn chunk(
    document: &Document,
    strategy: ChunkingStrategy,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>> {
    chunk_document(
        document,
        &ChunkingOptions {
            strategy,
            chunk_size,
            overlap,
            min_paragraph_chars: DEFAULT_MIN_PARAGRAPH_CHARS,
        },
    )
}

/// Split a document into chunks.
///
/// # Guarantees
///
/// - Empty (or whitespace-only) content yields no chunks.
/// - Positions are contiguous: `0, 1, …, N-1`, in emission order.
/// - Every chunk's content is trimmed and non-empty.
/// - The same document and options always yield the same ids and text.
///
/// # Errors
///
/// [`RagError::InvalidConfiguration`] when `chunk_size` is 0.
pub fn chunk_document(document: &Document, options: &ChunkingOptions) -> Result<Vec<DocumentChunk>> {
    options.validate()?;

    let text = document.content.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let pieces = match options.strategy {
        ChunkingStrategy::FixedSize => split_fixed(text, options.chunk_size, options.overlap),
        ChunkingStrategy::Paragraph => split_paragraphs(text, options.min_paragraph_chars),
        ChunkingStrategy::Sentence => split_sentences(text, options.chunk_size),
    };

    Ok(pieces
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(position, content)| DocumentChunk::new(document, position, content))
        .collect())
}

fn split_fixed(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let min_cut = chunk_size as f64 * BOUNDARY_RATIO;

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            // chars[end] is the first character past the window; a space
            // there means the window already ends on a word boundary.
            if let Some(ws) = (start..=end).rev().find(|&i| chars[i].is_whitespace()) {
                if (ws - start) as f64 > min_cut {
                    end = ws;
                }
            }
        }

        pieces.push(chars[start..end].iter().collect::<String>());

        if end >= len {
            break;
        }

        let overlap_start = end.saturating_sub(overlap);
        let mut next = (overlap_start..end)
            .find(|&i| chars[i].is_whitespace())
            .map(|ws| ws + 1)
            .unwrap_or(end);
        if next <= start {
            next = end;
        }
        start = next;
    }

    pieces
}

fn split_paragraphs(text: &str, min_chars: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
        .into_iter()
        .filter(|p| p.trim().chars().count() >= min_chars)
        .collect()
}

/// Split text after `.`, `!` or `?` when followed by whitespace or the
/// end of the text.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut begin = 0;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = iter.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                out.push(&text[begin..end]);
                begin = end;
            }
        }
    }
    if begin < text.len() {
        out.push(&text[begin..]);
    }

    out.into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_sentences(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0;

    for sentence in sentences(text) {
        let len = sentence.chars().count();
        let would_be = if buf.is_empty() {
            len
        } else {
            buf_chars + 1 + len
        };

        if would_be > chunk_size && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }

        if !buf.is_empty() {
            buf.push(' ');
            buf_chars += 1;
        }
        buf.push_str(sentence);
        buf_chars += len;
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}
