//! Prompt cache entries: embedded failure contexts and what they resolved to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::root_cause::DiscoveryMethod;

/// Model name recorded when an entry is resolved by semantic reuse.
pub const SEMANTIC_REUSE_MODEL: &str = "semantic-reuse";

/// A persisted failure context with its embedding and outcome.
///
/// Entries are written before the LLM runs, so `root_cause_id` is `None` for
/// contexts whose analysis failed or has not finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptCacheEntry {
    pub id: Uuid,
    /// Hex SHA-256 of `context_text`. Unique.
    pub content_hash: String,
    pub context_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub embedding_model: Option<String>,
    pub job_id: i64,
    pub linked_annotation_ids: Vec<i64>,
    pub linked_step_names: Vec<String>,
    pub root_cause_id: Option<Uuid>,
    pub confidence: Option<f64>,
    pub llm_model: Option<String>,
    pub llm_response: Option<String>,
    pub llm_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
    pub reuse_count: u64,
    pub last_reused_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::domain::ports::PromptCacheRepository::save`].
#[derive(Debug, Clone)]
pub struct NewPromptCacheEntry {
    pub content_hash: String,
    pub context_text: String,
    pub embedding: Vec<f32>,
    pub embedding_model: Option<String>,
    pub job_id: i64,
    pub linked_annotation_ids: Vec<i64>,
    pub linked_step_names: Vec<String>,
}

impl NewPromptCacheEntry {
    pub fn into_entry(self) -> PromptCacheEntry {
        PromptCacheEntry {
            id: Uuid::new_v4(),
            content_hash: self.content_hash,
            context_text: self.context_text,
            embedding: self.embedding,
            embedding_model: self.embedding_model,
            job_id: self.job_id,
            linked_annotation_ids: self.linked_annotation_ids,
            linked_step_names: self.linked_step_names,
            root_cause_id: None,
            confidence: None,
            llm_model: None,
            llm_response: None,
            llm_tokens: None,
            duration_ms: None,
            reuse_count: 0,
            last_reused_at: None,
            created_at: Utc::now(),
        }
    }
}

/// The result attached to a cache entry once a tier resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOutcome {
    pub model: String,
    pub response: String,
    pub tokens: u64,
    pub duration_ms: u64,
    pub root_cause_id: Option<Uuid>,
    pub confidence: f64,
}

/// A similarity-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEntry {
    pub entry: PromptCacheEntry,
    /// Cosine similarity in [-1, 1].
    pub similarity: f64,
    /// Discovery method of the entry's root cause.
    pub discovery_method: DiscoveryMethod,
    pub root_cause_category: String,
    pub root_cause_title: String,
}

/// Aggregate counters over the prompt cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptCacheStats {
    pub entries: u64,
    pub resolved: u64,
    pub total_reuses: u64,
}
