//! Embedding provider port for semantic vector generation.
//!
//! Turns failure contexts and root cause descriptions into dense vectors for
//! the semantic cache's similarity search.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// A generated embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
    /// Model that produced the vector.
    pub model: String,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "openai", "hashing").
    fn name(&self) -> &'static str;

    /// Model identifier recorded alongside stored vectors.
    fn model(&self) -> &str;

    /// Embedding dimension for this provider/model.
    fn dimension(&self) -> usize;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> DomainResult<Embedding>;
}
