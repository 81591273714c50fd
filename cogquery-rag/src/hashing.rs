//! Offline feature-hashing embedding provider.
//!
//! [`HashingEmbeddingProvider`] turns text into a bag-of-words vector: each
//! lower-cased alphanumeric token is hashed into one of `dimensions` buckets
//! and the resulting term-count vector is L2-normalised. Texts that share
//! words land close together, which is enough to separate topics without a
//! model download or an API key.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

/// Dimensionality used when none is configured.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// A deterministic, dependency-free [`EmbeddingProvider`].
///
/// # Example
///
/// ```rust,ignore
/// use cogquery_rag::HashingEmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(384);
/// let a = provider.embed("the sky is blue").await?;
/// let b = provider.embed("blue sky").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of the given length (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = token.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Hashing"
    }
}
