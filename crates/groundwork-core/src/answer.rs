//! Grounded answer composition.
//!
//! [`AnswerComposer`] retrieves context for a query, assembles one prompt
//! from the retrieved chunks, and asks a [`CompletionGateway`] to answer
//! from that context alone. Provider failures never reach the caller:
//! they are logged and replaced with a degraded, non-empty answer.
//!
//! # Prompt Layout
//!
//! ```text
//! Context:
//! [1] Returns Policy
//! Items may be returned within 30 days.
//!
//! [2] ...
//!
//! Question: How long do I have to return an item?
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::CompletionGateway;
use crate::error::{RagError, Result};
use crate::models::{Answer, SearchResult, SourceCitation};
use crate::search::Retriever;

/// Instructions sent as the system prompt.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using only the \
numbered context passages provided. If the context does not contain enough information to \
answer, say explicitly that the available information is insufficient. Do not invent facts.";

/// Returned when retrieval finds nothing above the similarity threshold.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the knowledge base to answer that question.";

/// Returned when the query cannot be embedded.
pub const RETRIEVAL_UNAVAILABLE_ANSWER: &str =
    "Search is temporarily unavailable, so I can't look up an answer right now. Please try again later.";

/// Lead sentence of the answer returned when completion fails.
pub const GENERATION_UNAVAILABLE_ANSWER: &str =
    "Live answer generation is currently unavailable.";

/// Answer composition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Upper bound on the characters of chunk content placed in the
    /// prompt. The first source is always included, truncated if needed.
    pub max_context_chars: usize,
    /// Characters of chunk content kept in each citation preview.
    pub preview_chars: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
            preview_chars: 200,
        }
    }
}

impl ComposerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.preview_chars == 0 {
            return Err(RagError::InvalidConfiguration(
                "preview_chars must be > 0".to_string(),
            ));
        }
        if self.max_context_chars == 0 {
            return Err(RagError::InvalidConfiguration(
                "max_context_chars must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Confidence heuristic for an answer built from `scores`.
///
/// `min(mean(scores) + 0.2, 1.0)`; `0.0` when there are no scores. There
/// is no lower floor, so a negative mean (possible with a negative
/// similarity threshold) yields a negative confidence. This is an arbitrary heuristic kept for compatibility with
/// existing consumers. It is not a calibrated probability and should not
/// be read as one.
///
/// ```rust
/// use groundwork_core::answer::confidence_from_scores;
///
/// assert_eq!(confidence_from_scores(&[]), 0.0);
/// assert!((confidence_from_scores(&[0.5, 0.7]) - 0.8).abs() < 1e-6);
/// assert_eq!(confidence_from_scores(&[0.95]), 1.0);
/// ```
pub fn confidence_from_scores(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let avg = scores.iter().sum::<f32>() / scores.len() as f32;
    (avg + 0.2).min(1.0)
}

/// Retrieves context and generates grounded answers.
pub struct AnswerComposer {
    retriever: Arc<Retriever>,
    completer: Arc<dyn CompletionGateway>,
    config: ComposerConfig,
}

impl AnswerComposer {
    pub fn new(
        retriever: Arc<Retriever>,
        completer: Arc<dyn CompletionGateway>,
        config: ComposerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retriever,
            completer,
            config,
        })
    }

    /// Answer `query` from the documents visible to `owner_filter`.
    ///
    /// Never fails because a provider is down: retrieval or completion
    /// failures produce a degraded [`Answer`] (`degraded == true`).
    ///
    /// # Errors
    ///
    /// Only store invariant violations, e.g.
    /// [`RagError::DimensionMismatch`] when the embedding model changed
    /// under an existing store.
    pub async fn answer(&self, query: &str, owner_filter: Option<&str>) -> Result<Answer> {
        let top_k = self.retriever.config().top_k;

        let results = match self.retriever.retrieve(query, owner_filter, top_k).await {
            Ok(r) => r,
            Err(RagError::RetrievalUnavailable(_)) => {
                warn!("answering without retrieval: query embedding unavailable");
                return Ok(Answer {
                    answer_text: RETRIEVAL_UNAVAILABLE_ANSWER.to_string(),
                    sources: Vec::new(),
                    confidence: 0.0,
                    degraded: true,
                });
            }
            Err(e) => return Err(e),
        };

        if results.is_empty() {
            debug!("no sources above threshold");
            return Ok(Answer {
                answer_text: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                degraded: false,
            });
        }

        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        let confidence = confidence_from_scores(&scores);
        let sources: Vec<SourceCitation> = results
            .iter()
            .map(|r| self.citation(r))
            .collect();

        let prompt = build_prompt(query, &results, self.config.max_context_chars);

        match self.completer.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !text.trim().is_empty() => Ok(Answer {
                answer_text: text.trim().to_string(),
                sources,
                confidence,
                degraded: false,
            }),
            Ok(_) => {
                warn!(model = self.completer.model_name(), "completion returned empty text");
                Ok(degraded_answer(sources, confidence))
            }
            Err(e) => {
                warn!(model = self.completer.model_name(), error = %e, "completion failed");
                Ok(degraded_answer(sources, confidence))
            }
        }
    }

    fn citation(&self, result: &SearchResult) -> SourceCitation {
        SourceCitation {
            title: result.document.title.clone(),
            source: result.document.source.clone(),
            score: result.score,
            preview: preview(&result.chunk.content, self.config.preview_chars),
        }
    }
}

fn degraded_answer(sources: Vec<SourceCitation>, confidence: f32) -> Answer {
    let mut text = String::from(GENERATION_UNAVAILABLE_ANSWER);
    text.push_str(" The most relevant sources found were:");
    for (i, s) in sources.iter().enumerate() {
        text.push_str(&format!("\n[{}] {}", i + 1, s.title));
    }

    Answer {
        answer_text: text,
        sources,
        confidence,
        degraded: true,
    }
}

/// Build the user prompt: numbered context passages then the question.
///
/// Passages are added in rank order until `max_context_chars` of chunk
/// content is reached. The first passage is always present, cut to the
/// budget if it alone exceeds it.
pub fn build_prompt(query: &str, results: &[SearchResult], max_context_chars: usize) -> String {
    let mut prompt = String::from("Context:\n");
    let mut used = 0usize;

    for (i, r) in results.iter().enumerate() {
        let len = r.chunk.content.chars().count();
        let content = if used + len <= max_context_chars {
            r.chunk.content.clone()
        } else if i == 0 {
            r.chunk.content.chars().take(max_context_chars).collect()
        } else {
            break;
        };
        used += content.chars().count();

        prompt.push_str(&format!("[{}] {}\n{}\n\n", i + 1, r.document.title, content));
    }

    prompt.push_str("Question: ");
    prompt.push_str(query.trim());
    prompt
}

/// First `max_chars` characters of `content`, with an ellipsis when cut.
fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut s: String = content.chars().take(max_chars).collect();
    s.push('…');
    s
}
