//! Tier 2: reuse of past analyses by exact hash or embedding similarity.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CacheProbe, FailureContext, JobEvidence, NewPromptCacheEntry, PromptCacheEntry, SimilarCandidate,
};
use crate::domain::ports::{EmbeddingProvider, KnowledgeStore, PromptCacheRepository};

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticCacheSettings {
    pub threshold: f64,
    pub limit: usize,
}

impl Default for SemanticCacheSettings {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            limit: 5,
        }
    }
}

pub struct SemanticCache {
    entries: Arc<dyn PromptCacheRepository>,
    knowledge: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: SemanticCacheSettings,
}

impl SemanticCache {
    pub fn new(
        entries: Arc<dyn PromptCacheRepository>,
        knowledge: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: SemanticCacheSettings,
    ) -> Self {
        Self {
            entries,
            knowledge,
            embedder,
            settings,
        }
    }

    pub fn entries(&self) -> &Arc<dyn PromptCacheRepository> {
        &self.entries
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Look up a failure context.
    ///
    /// An exact hash hit never re-embeds. A miss embeds the context and saves
    /// the entry before searching, so the attempt is recorded even if the
    /// LLM call that follows fails. Storage errors propagate; embedding
    /// errors become [`CacheProbe::Unavailable`].
    pub async fn probe(&self, context: &FailureContext, evidence: &JobEvidence) -> DomainResult<CacheProbe> {
        if let Some(entry) = self.entries.find_by_hash(context.hash()).await? {
            return self.probe_existing(entry).await;
        }

        let embedding = match self.embedder.embed(context.text()).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(job_id = evidence.job.id, error = %e, "embedding failed");
                return Ok(CacheProbe::Unavailable { reason: e.to_string() });
            }
        };

        let entry = self
            .entries
            .save(NewPromptCacheEntry {
                content_hash: context.hash().to_string(),
                context_text: context.text().to_string(),
                embedding: embedding.vector,
                embedding_model: Some(embedding.model),
                job_id: evidence.job.id,
                linked_annotation_ids: evidence.annotations.iter().filter_map(|a| a.id).collect(),
                linked_step_names: evidence.failed_steps.iter().map(|s| s.name.clone()).collect(),
            })
            .await?;
        debug!(job_id = evidence.job.id, entry_id = %entry.id, "saved prompt cache entry");

        let top = self.top_candidate(&entry).await?;
        Ok(CacheProbe::Searched { entry_id: entry.id, top })
    }

    async fn probe_existing(&self, entry: PromptCacheEntry) -> DomainResult<CacheProbe> {
        let Some(root_cause_id) = entry.root_cause_id else {
            debug!(entry_id = %entry.id, "exact hit on unresolved entry");
            let top = self.top_candidate(&entry).await?;
            return Ok(CacheProbe::Searched { entry_id: entry.id, top });
        };

        if self.knowledge.get_root_cause_by_id(root_cause_id).await?.is_some() {
            Ok(CacheProbe::ExactResolved {
                entry_id: entry.id,
                root_cause_id,
                confidence: entry.confidence.unwrap_or(0.0),
            })
        } else {
            warn!(entry_id = %entry.id, %root_cause_id, "cached root cause no longer exists");
            Ok(CacheProbe::ExactDangling { entry_id: entry.id })
        }
    }

    /// Best resolved neighbour of `entry`, excluding itself.
    async fn top_candidate(&self, entry: &PromptCacheEntry) -> DomainResult<Option<SimilarCandidate>> {
        let vector = if entry.embedding.is_empty() {
            match self.embedder.embed(&entry.context_text).await {
                Ok(embedding) => embedding.vector,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "re-embedding failed, skipping similarity search");
                    return Ok(None);
                }
            }
        } else {
            entry.embedding.clone()
        };

        let similar = self
            .entries
            .find_similar(&vector, self.settings.threshold, self.settings.limit.saturating_add(1))
            .await?;

        Ok(similar
            .into_iter()
            .filter(|s| s.entry.id != entry.id)
            .find_map(|s| {
                let root_cause_id = s.entry.root_cause_id?;
                Some(SimilarCandidate {
                    entry_id: s.entry.id,
                    root_cause_id,
                    category: s.root_cause_category,
                    title: s.root_cause_title,
                    similarity: s.similarity,
                    reuse_count: s.entry.reuse_count,
                    confidence: s.entry.confidence,
                    discovery_method: s.discovery_method,
                })
            })
            .inspect(|c| debug!(entry_id = %c.entry_id, similarity = c.similarity, "top similar entry")))
    }
}
