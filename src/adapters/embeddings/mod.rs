//! Embedding provider adapters.

pub mod hashing;
pub mod openai;

pub use hashing::{HashingEmbeddingProvider, HASHING_MODEL};
pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EmbeddingConfig;
use crate::domain::ports::EmbeddingProvider;

/// Build the embedding provider named by `embedding.provider`.
pub fn build_embedding_provider(config: &EmbeddingConfig) -> DomainResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbeddingProvider::new(config.dimension)?)),
        "openai" => {
            let defaults = OpenAiEmbeddingConfig::default();
            Ok(Arc::new(OpenAiEmbeddingProvider::new(OpenAiEmbeddingConfig {
                api_key: config.api_key.clone(),
                base_url: config.base_url.clone().unwrap_or(defaults.base_url),
                model: config.model.clone().unwrap_or(defaults.model),
                dimension: config.dimension,
                ..defaults
            })?))
        }
        other => Err(DomainError::ValidationFailed(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}
