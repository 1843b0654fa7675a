//! Embedding generation and vector similarity math
//!
//! Backends:
//! - OpenAI-compatible HTTP API (`HttpEmbedder`)
//! - Local character n-gram hashing (`CharGramEmbedder`), deterministic,
//!   no external dependencies; used for tests and offline operation

mod chargram;

pub use chargram::CharGramEmbedder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{MnemoError, Result};
use crate::types::EmbeddingConfig;

/// Identity of an embedding model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub dimension: usize,
}

/// Maps text to a fixed-length numeric vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Declared model identity, including the fixed dimension
    fn model_info(&self) -> ModelInfo;

    /// Connectivity self-test
    async fn test_connection(&self) -> bool;
}

/// OpenAI-compatible embedding client.
///
/// Works against OpenAI, OpenRouter, Azure OpenAI, and other compatible
/// `/embeddings` endpoints.
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Create an embedder with default endpoint and model
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, None, None, None)
    }

    /// Create an embedder with custom endpoint, model, and dimension
    pub fn with_config(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimensions: dimensions.unwrap_or(1536),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "input": text,
                "model": self.model,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MnemoError::Embedding(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let embedding: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| MnemoError::Embedding("Invalid response format".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.len() != self.dimensions {
            return Err(MnemoError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            dimension: self.dimensions,
        }
    }

    async fn test_connection(&self) -> bool {
        self.embed("connection test").await.is_ok()
    }
}

/// Create an embedder from configuration.
///
/// Backends: `"openai"` (requires an API key) or `"chargram"` (local).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                MnemoError::Config(
                    "api_key is required for the openai embedding backend".to_string(),
                )
            })?;
            Ok(Arc::new(HttpEmbedder::with_config(
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                Some(config.dimensions),
            )))
        }
        "chargram" => Ok(Arc::new(CharGramEmbedder::new(config.dimensions))),
        other => Err(MnemoError::Config(format!(
            "Unknown embedding backend: '{}'. Use 'openai' or 'chargram'",
            other
        ))),
    }
}

/// Euclidean norm of a vector
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Cosine similarity with precomputed norms, avoiding the per-record
/// norm recomputation on every similarity scan
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if a.len() != b.len() || norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cached_norm_matches_direct() {
        let a = vec![0.3, -1.2, 4.0];
        let b = vec![2.0, 0.5, -0.7];
        let direct = cosine_similarity(&a, &b);
        let cached = cosine_with_norms(&a, l2_norm(&a), &b, l2_norm(&b));
        assert!((direct - cached).abs() < 1e-6);
    }

    #[test]
    fn test_create_embedder_chargram() {
        let config = EmbeddingConfig {
            backend: "chargram".to_string(),
            dimensions: 384,
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_info().dimension, 384);
    }

    #[test]
    fn test_create_embedder_openai_requires_key() {
        let config = EmbeddingConfig {
            backend: "openai".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_create_embedder_unknown_backend() {
        let config = EmbeddingConfig {
            backend: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
