//! Persistence for the semantic prompt cache.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CacheOutcome, NewPromptCacheEntry, PromptCacheEntry, PromptCacheStats, SimilarEntry,
};

#[async_trait]
pub trait PromptCacheRepository: Send + Sync {
    async fn find_by_hash(&self, content_hash: &str) -> DomainResult<Option<PromptCacheEntry>>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<PromptCacheEntry>>;

    /// Persist a context. If another writer stored the same hash first, the
    /// existing entry is returned instead.
    async fn save(&self, entry: NewPromptCacheEntry) -> DomainResult<PromptCacheEntry>;

    /// Resolved entries whose root cause still exists, with similarity at or
    /// above `threshold`, best first.
    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> DomainResult<Vec<SimilarEntry>>;

    async fn mark_reused(&self, id: Uuid) -> DomainResult<()>;

    async fn attach_outcome(&self, id: Uuid, outcome: &CacheOutcome) -> DomainResult<()>;

    async fn stats(&self) -> DomainResult<PromptCacheStats>;
}
