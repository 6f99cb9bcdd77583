//! Embedding provider abstraction and the degraded-mode client.
//!
//! - **[`EmbeddingProvider`]**: one text in, one vector out. May fail.
//! - **[`OpenAIProvider`]**: calls `POST {base_url}/embeddings` with the
//!   shared retry/backoff policy in [`crate::http`].
//! - **[`EmbeddingClient`]**: what the rest of the crate uses. It never
//!   fails: with no provider configured, or when the provider errors, it
//!   returns an all-zero vector of the configured dimension. Callers that
//!   care check [`EmbeddingClient::is_available`].
//!
//! Also provides the vector utilities used by the chunk stores:
//! - [`cosine_similarity`]
//! - [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage
//!
//! # Provider Selection
//!
//! | `embedding.provider` | API key env set | Result |
//! |----------------------|-----------------|--------|
//! | `"disabled"` | any | no provider, zero vectors |
//! | `"openai"` | no | no provider, zero vectors (warned once) |
//! | `"openai"` | yes | [`OpenAIProvider`] |

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::http;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ OpenAI Provider ============

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = http::post_json_with_retry(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings reply.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Provider("Invalid embeddings response: missing embedding".into()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Build the configured provider, or `None` when running without one.
pub fn create_provider(config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    if !config.is_enabled() {
        return None;
    }
    let api_key = match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!(
                env = %config.api_key_env,
                "Embedding API key not set; embeddings run in degraded mode"
            );
            return None;
        }
    };
    match OpenAIProvider::new(config, api_key) {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            warn!(error = %e, "Failed to build embedding client; embeddings run in degraded mode");
            None
        }
    }
}

// ============ Client ============

/// Degraded-mode wrapper around an optional [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    dims: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>, dims: usize) -> Self {
        Self { provider, dims }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(create_provider(config), config.dims)
    }

    /// A client that always returns zero vectors.
    pub fn disabled(dims: usize) -> Self {
        Self::new(None, dims)
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed `text`. Returns a zero vector of [`dims`](Self::dims) when no
    /// provider is configured or the call fails.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let Some(provider) = &self.provider else {
            return vec![0.0; self.dims];
        };

        let cleaned = text.replace(['\r', '\n'], " ");
        match provider.embed(&cleaned).await {
            Ok(vector) if vector.len() == self.dims => vector,
            Ok(vector) => {
                warn!(
                    expected = self.dims,
                    got = vector.len(),
                    model = provider.model_name(),
                    "Embedding has wrong dimension, using zero vector"
                );
                vec![0.0; self.dims]
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed, using zero vector");
                debug!(text = %crate::error::truncate_chars(text, 50), "Failed embedding input");
                vec![0.0; self.dims]
            }
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<String>>,
        reply: Result<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingProvider for Recording {
        fn model_name(&self) -> &str {
            "recording"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            match &self.reply {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(Error::Provider("boom".into())),
            }
        }
    }

    #[tokio::test]
    async fn test_no_provider_gives_zero_vector_of_configured_dims() {
        let client = EmbeddingClient::disabled(1536);
        assert!(!client.is_available());
        let v = client.embed("hello").await;
        assert_eq!(v.len(), 1536);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_newlines_become_spaces() {
        let provider = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply: Ok(vec![1.0, 0.0, 0.0]),
        });
        let client = EmbeddingClient::new(Some(provider.clone()), 3);
        assert_eq!(client.embed("a\nb\r\nc").await, vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.seen.lock().unwrap()[0], "a b  c");
    }

    #[tokio::test]
    async fn test_provider_error_and_wrong_dims_fall_back() {
        let failing = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply: Err(Error::Provider("x".into())),
        });
        let client = EmbeddingClient::new(Some(failing), 3);
        assert_eq!(client.embed("q").await, vec![0.0; 3]);

        let short = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            reply: Ok(vec![1.0]),
        });
        let client = EmbeddingClient::new(Some(short), 3);
        assert_eq!(client.embed("q").await, vec![0.0; 3]);
    }

    #[test]
    fn test_disabled_config_creates_no_provider() {
        let config = EmbeddingConfig {
            provider: "disabled".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_none());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -0.25]}]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -0.25]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

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
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_and_mismatch() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
