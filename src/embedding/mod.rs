//! Embedding gateway implementations.
//!
//! Concrete [`EmbeddingGateway`]s selected by `[embedding].provider`:
//! - **[`DisabledEmbedder`]**: always fails; chunks are stored without
//!   vectors and answers degrade.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings` with batching, retry, and backoff.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`hashing`**: the offline [`HashingEmbedder`] from the core crate.
//!
//! # Provider Selection
//!
//! ```rust
//! # use groundwork::config::EmbeddingConfig;
//! # use groundwork::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use groundwork_core::embedding::{EmbeddingGateway, HashingEmbedder};
use groundwork_core::RagError;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ Disabled ============

/// Embedder that always returns [`RagError::EmbeddingUnavailable`].
pub struct DisabledEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingGateway for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, _text: &str) -> groundwork_core::Result<Vec<f32>> {
        Err(RagError::EmbeddingUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable. Texts are sent
/// `batch_size` at a time; a failed request fails only the texts in it.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key,
            url: http::join_url(base, "v1/embeddings"),
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> groundwork_core::Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<groundwork_core::Result<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let result = self.request(batch).await;
            out.extend(spread(batch.len(), result));
        }
        out
    }
}

/// Parse the OpenAI embeddings response, ordering vectors by `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance (`POST /api/embed`).
///
/// Requires Ollama to be running with the model pulled (e.g.
/// `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(base, "api/embed"),
            model,
            dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> groundwork_core::Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<groundwork_core::Result<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let result = self.request(batch).await;
            out.extend(spread(batch.len(), result));
        }
        out
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Helpers ============

/// Turn one batch request's outcome into one result per input text.
fn spread(
    expected: usize,
    result: Result<Vec<Vec<f32>>>,
) -> Vec<groundwork_core::Result<Vec<f32>>> {
    match result {
        Ok(vectors) if vectors.len() == expected => vectors.into_iter().map(Ok).collect(),
        Ok(vectors) => {
            let msg = format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            );
            (0..expected)
                .map(|_| Err(RagError::EmbeddingUnavailable(msg.clone())))
                .collect()
        }
        Err(e) => {
            let msg = format!("{:#}", e);
            (0..expected)
                .map(|_| Err(RagError::EmbeddingUnavailable(msg.clone())))
                .collect()
        }
    }
}

fn single(mut results: Vec<groundwork_core::Result<Vec<f32>>>) -> groundwork_core::Result<Vec<f32>> {
    results.pop().unwrap_or_else(|| {
        Err(RagError::EmbeddingUnavailable(
            "empty embedding response".to_string(),
        ))
    })
}

/// Create the [`EmbeddingGateway`] named by `config.provider`.
///
/// | Config Value | Gateway |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder {
            dims: config.dims.unwrap_or(0),
        })),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashing" => {
            let dims = config
                .dims
                .ok_or_else(|| anyhow!("embedding.dims required for hashing provider"))?;
            Ok(Arc::new(HashingEmbedder::new(dims)?))
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: Some("test-model".to_string()),
            dims: Some(3),
            max_retries: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_rejects_malformed() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
        assert!(parse_openai_response(&serde_json::json!({"data": [{"index": 0}]})).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 2.0]]});
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1], vec![1.0, 2.0]);
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1]})).is_err());
    }

    #[test]
    fn test_spread_count_mismatch_fails_all() {
        let out = spread(2, Ok(vec![vec![1.0]]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| matches!(r, Err(RagError::EmbeddingUnavailable(_)))));
    }

    #[test]
    fn test_create_embedder() {
        assert_eq!(create_embedder(&EmbeddingConfig::default()).unwrap().model_name(), "disabled");

        let hashing = create_embedder(&EmbeddingConfig {
            provider: "hashing".to_string(),
            dims: Some(64),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(hashing.dims(), 64);

        assert!(create_embedder(&config("bogus")).is_err());
        let mut no_model = config("ollama");
        no_model.model = None;
        assert!(create_embedder(&no_model).is_err());
    }

    #[tokio::test]
    async fn test_disabled_embed_fails() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert!(matches!(
            embedder.embed("x").await,
            Err(RagError::EmbeddingUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_openai_embedder_batches() {
        let (url, mut rx) = test_server::serve(vec![
            (
                200,
                r#"{"data":[{"index":0,"embedding":[1,0,0]},{"index":1,"embedding":[0,1,0]}]}"#
                    .to_string(),
            ),
            (200, r#"{"data":[{"index":0,"embedding":[0,0,1]}]}"#.to_string()),
        ])
        .await;

        let mut cfg = config("openai");
        cfg.url = Some(url);
        cfg.batch_size = 2;
        let embedder = OpenAIEmbedder::with_api_key(&cfg, "sk-test".to_string()).unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = embedder.embed_batch(&texts).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].as_ref().unwrap(), &vec![0.0, 0.0, 1.0]);

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["model"], "test-model");
        assert_eq!(first["input"], serde_json::json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_ollama_error_is_embedding_unavailable() {
        let (url, _rx) =
            test_server::serve(vec![(404, r#"{"error":"model not found"}"#.to_string())]).await;
        let mut cfg = config("ollama");
        cfg.url = Some(url);
        let embedder = OllamaEmbedder::new(&cfg).unwrap();

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }
}
