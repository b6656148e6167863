//! Completion gateway trait.
//!
//! The answer composer hands a system prompt and a user prompt to a
//! [`CompletionGateway`] and receives generated text. Concrete providers
//! (OpenAI chat completions, Ollama chat) live in the `groundwork`
//! application crate.

use async_trait::async_trait;

use crate::error::Result;

/// Generates text from a prompt pair.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate a completion.
    ///
    /// # Errors
    ///
    /// [`RagError::CompletionUnavailable`](crate::error::RagError::CompletionUnavailable)
    /// on provider error or timeout.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
