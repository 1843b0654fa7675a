//! Character n-gram embedding fallback
//!
//! Deterministic feature hashing over character bigrams, so mixed-script
//! text embeds without a tokenizer. Suited to tests and environments
//! where API calls aren't possible.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::embedding::{Embedder, ModelInfo};
use crate::error::Result;

/// Local embedder using the hashing trick over character n-grams
pub struct CharGramEmbedder {
    dimensions: usize,
}

impl CharGramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Split into character bigrams plus whole ASCII words
    fn grams(text: &str) -> Vec<String> {
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let mut grams: Vec<String> = chars.windows(2).map(|w| w.iter().collect()).collect();

        // Whole words carry signal for Latin text that bigrams dilute
        grams.extend(
            text.to_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|s| s.len() > 2)
                .map(String::from),
        );

        grams
    }

    fn hash_gram(gram: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        gram.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    /// Sign hashing reduces collision impact
    fn hash_sign(gram: &str) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        format!("{}_sign", gram).hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let grams = Self::grams(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if grams.is_empty() {
            return embedding;
        }

        let mut counts: HashMap<String, f32> = HashMap::new();
        for gram in &grams {
            *counts.entry(gram.clone()).or_insert(0.0) += 1.0;
        }

        let total = grams.len() as f32;
        for (gram, count) in counts {
            let weight = (1.0 + count / total).ln();
            let idx = Self::hash_gram(&gram, self.dimensions);
            embedding[idx] += weight * Self::hash_sign(&gram);
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for CharGramEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "chargram".to_string(),
            dimension: self.dimensions,
        }
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
