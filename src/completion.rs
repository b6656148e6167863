//! Completion gateway implementations.
//!
//! Concrete [`CompletionGateway`]s selected by `[completion].provider`:
//! - **[`DisabledCompleter`]**: always fails, so `gw ask` returns the
//!   degraded answer with its sources.
//! - **[`OpenAICompleter`]**: `POST /v1/chat/completions`.
//! - **[`OllamaCompleter`]**: `POST /api/chat` with streaming off.
//!
//! Both network adapters use the retry policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use groundwork_core::completion::CompletionGateway;
use groundwork_core::RagError;
use std::sync::Arc;

use crate::config::CompletionConfig;
use crate::http;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Completer that always returns [`RagError::CompletionUnavailable`].
pub struct DisabledCompleter;

#[async_trait]
impl CompletionGateway for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> groundwork_core::Result<String> {
        Err(RagError::CompletionUnavailable(
            "completion provider is disabled".to_string(),
        ))
    }
}

/// Chat completions via the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAICompleter {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAICompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    fn with_api_key(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("completion.model required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key,
            url: http::join_url(base, "v1/chat/completions"),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionGateway for OpenAICompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> groundwork_core::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let json = http::post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(unavailable)?;
        parse_openai_chat(&json).map_err(unavailable)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Chat via a local Ollama instance.
pub struct OllamaCompleter {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OllamaCompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("completion.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(base, "api/chat"),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionGateway for OllamaCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> groundwork_core::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let json = http::post_json(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(unavailable)?;
        parse_ollama_chat(&json).map_err(unavailable)
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

fn unavailable(e: anyhow::Error) -> RagError {
    RagError::CompletionUnavailable(format!("{:#}", e))
}

/// Create the [`CompletionGateway`] named by `config.provider`.
///
/// | Config Value | Gateway |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledCompleter`] |
/// | `"openai"` | [`OpenAICompleter`] |
/// | `"ollama"` | [`OllamaCompleter`] |
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn CompletionGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompleter)),
        "openai" => Ok(Arc::new(OpenAICompleter::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaCompleter::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}
