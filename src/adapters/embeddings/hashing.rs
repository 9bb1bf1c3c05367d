//! Local feature-hashing embedding provider.
//!
//! Produces deterministic vectors without any network access: every
//! lowercase alphanumeric token and token bigram is hashed (FNV-1a) into a
//! signed bucket, and the result is L2-normalized. Texts that share most of
//! their tokens land close together in cosine space, which is what the
//! semantic cache needs for near-duplicate CI failures.

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::embedding::{Embedding, EmbeddingProvider};

pub const HASHING_MODEL: &str = "fnv1a-token-hashing";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> DomainResult<Self> {
        if dimension == 0 {
            return Err(DomainError::ValidationFailed(
                "embedding dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Compute the vector for a text.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut vector = vec![0.0_f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn model(&self) -> &str {
        HASHING_MODEL
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> DomainResult<Embedding> {
        Ok(Embedding {
            vector: self.vectorize(text),
            dimensions: self.dimension,
            model: HASHING_MODEL.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashingEmbeddingProvider::new(64).unwrap();
        let a = provider.vectorize("npm ERR! code ERESOLVE");
        let b = provider.vectorize("npm ERR! code ERESOLVE");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let provider = HashingEmbeddingProvider::new(128).unwrap();
        let a = provider.vectorize("Error: linker failed");
        let b = provider.vectorize("error linker FAILED");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similar_texts_score_higher_than_unrelated() {
        let provider = HashingEmbeddingProvider::new(384).unwrap();
        let base = provider.vectorize("workflow: CI job: test errors: assertion failed in test_login");
        let near = provider.vectorize("workflow: CI job: test errors: assertion failed in test_logout");
        let far = provider.vectorize("docker pull rate limit exceeded for registry");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8).unwrap();
        assert!(provider.vectorize("  !! ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbeddingProvider::new(0).is_err());
    }
}
