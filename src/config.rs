//! TOML configuration.
//!
//! Every section except `[db]` may be omitted; missing fields take the
//! defaults below. [`load_config`] parses and validates the file so the
//! rest of the application can trust the values.
//!
//! ```toml
//! [db]
//! path = "./data/gw.sqlite"
//!
//! [chunking]
//! strategy = "fixed_size"   # fixed_size | paragraph | sentence
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! similarity_threshold = 0.3
//! top_k = 5
//!
//! [embedding]
//! provider = "openai"       # disabled | openai | ollama | hashing
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [completion]
//! provider = "openai"       # disabled | openai | ollama
//! model = "gpt-4o-mini"
//!
//! [logging]
//! level = "warn"
//! ```

use anyhow::{bail, Context, Result};
use groundwork_core::answer::ComposerConfig;
use groundwork_core::chunk::{ChunkingOptions, ChunkingStrategy, DEFAULT_MIN_PARAGRAPH_CHARS};
use groundwork_core::search::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
use groundwork_core::RagConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_paragraph_chars: default_min_paragraph_chars(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_min_paragraph_chars() -> usize {
    DEFAULT_MIN_PARAGRAPH_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_completion_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_completion_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    512
}
fn default_completion_max_retries() -> u32 {
    2
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_context_chars() -> usize {
    6000
}
fn default_preview_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Settings that load fine but are probably not what the user meant.
    ///
    /// Returned rather than logged so the caller can report them once the
    /// tracing subscriber is installed.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.chunking.overlap >= self.chunking.chunk_size {
            warnings.push(format!(
                "chunking.overlap ({}) >= chunking.chunk_size ({}); chunks will not overlap",
                self.chunking.overlap, self.chunking.chunk_size
            ));
        }
        warnings
    }

    /// Settings for the core service.
    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            chunking: ChunkingOptions {
                strategy: self.chunking.strategy,
                chunk_size: self.chunking.chunk_size,
                overlap: self.chunking.overlap,
                min_paragraph_chars: self.chunking.min_paragraph_chars,
            },
            retrieval: groundwork_core::search::RetrievalConfig {
                similarity_threshold: self.retrieval.similarity_threshold,
                top_k: self.retrieval.top_k,
            },
            answer: ComposerConfig {
                max_context_chars: self.answer.max_context_chars,
                preview_chars: self.answer.preview_chars,
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or hashing.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "hashing" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Completion
    match config.completion.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.completion.model.is_none() {
                bail!(
                    "completion.model must be specified when provider is '{}'",
                    config.completion.provider
                );
            }
        }
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Answer
    if config.answer.preview_chars == 0 {
        bail!("answer.preview_chars must be > 0");
    }
    if config.answer.max_context_chars == 0 {
        bail!("answer.max_context_chars must be > 0");
    }

    Ok(())
}
