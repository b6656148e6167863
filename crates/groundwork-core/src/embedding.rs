//! Embedding gateway trait and vector utilities.
//!
//! Defines the [`EmbeddingGateway`] trait that every embedding backend
//! implements, the offline [`HashingEmbedder`], and pure helpers for
//! similarity computation and vector serialization.
//!
//! Network-backed providers (OpenAI, Ollama) live in the `groundwork`
//! application crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// Converts text into a fixed-length vector.
///
/// All vectors produced by one gateway share [`dims`](Self::dims); a
/// store must never mix vectors from gateways of different models.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one text.
    ///
    /// # Errors
    ///
    /// [`RagError::EmbeddingUnavailable`] on provider error or timeout.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts. Results are returned in input order, one per
    /// text, so a failure affects only its own slot.
    ///
    /// The default runs [`embed`](Self::embed) for every text
    /// concurrently; batch-capable providers override it.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        futures::future::join_all(texts.iter().map(|t| self.embed(t))).await
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns `dot(a, b) / (|a| * |b|)`, clamped to `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` when either vector has zero magnitude, and for vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_nan() {
        0.0
    } else {
        sim.clamp(-1.0, 1.0)
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use groundwork_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole f32 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Offline, deterministic embedder based on feature hashing.
///
/// Each lowercase alphanumeric token contributes its character trigrams
/// (or the whole token when shorter than three characters); every
/// feature increments one of `dims` buckets chosen by SHA-256. The
/// result is L2-normalized. Inflected forms share trigrams ("return",
/// "returned"), which makes it good enough for demos and tests but it
/// carries no semantics beyond surface overlap.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::InvalidConfiguration(
                "hashing embedder dims must be > 0".to_string(),
            ));
        }
        Ok(Self { dims })
    }

    /// Synchronous embedding; never fails.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for feature in features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dims as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn features(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();

    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 3 {
            out.push(token.to_string());
        } else {
            out.extend(chars.windows(3).map(|w| w.iter().collect::<String>()));
        }
    }

    out
}

#[async_trait]
impl EmbeddingGateway for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_bounded_for_large_values() {
        let a = vec![1e18f32, 1e18, 1e18];
        let sim = cosine_similarity(&a, &a);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_hashing_embedder_rejects_zero_dims() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_hashing_embedder_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64).unwrap();
        let a = e.embed_text("Items may be returned within 30 days.");
        let b = e.embed_text("Items may be returned within 30 days.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero() {
        let e = HashingEmbedder::new(16).unwrap();
        assert!(e.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_embedder_prefers_shared_stems() {
        let e = HashingEmbedder::new(512).unwrap();
        let q = e.embed_text("How long do I have to return an item?");
        let near = e.embed_text("Items may be returned within 30 days.");
        let far = e.embed_text("Exchanges are accepted within 14 days.");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn test_default_embed_batch_preserves_order() {
        let e = HashingEmbedder::new(32).unwrap();
        let texts = vec!["first".to_string(), "second".to_string()];
        let out = e.embed_batch(&texts).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &e.embed_text("first"));
        assert_eq!(out[1].as_ref().unwrap(), &e.embed_text("second"));
    }
}
