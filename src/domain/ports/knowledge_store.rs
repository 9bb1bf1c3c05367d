//! Root cause catalog and detection links.

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Detection, EmbeddingMetadata, FoundRootCause, JobRootCauseLink, RootCause, RootCauseCandidate,
};

/// Repository for the root cause catalog.
///
/// Null ids are accepted by the counters so callers never need to special
/// case a catalog row that was deleted underneath them.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert-or-fetch by `(category, title)`. Safe under concurrent calls
    /// for the same key.
    async fn find_or_create_root_cause(
        &self,
        candidate: &RootCauseCandidate,
    ) -> DomainResult<FoundRootCause>;

    /// Append a detection row. `root_cause_id = None` records an attempt.
    async fn link_job(
        &self,
        job_id: i64,
        root_cause_id: Option<Uuid>,
        detection: &Detection,
    ) -> DomainResult<JobRootCauseLink>;

    /// Increment `occurrence_count`. No-op for `None` or a missing row.
    async fn bump_occurrence(&self, root_cause_id: Option<Uuid>) -> DomainResult<()>;

    /// Stamp `last_seen_at = now`. No-op for `None` or a missing row.
    async fn touch_last_seen(&self, root_cause_id: Option<Uuid>) -> DomainResult<()>;

    /// Returns `None` when the id no longer exists.
    async fn get_root_cause_by_id(&self, id: Uuid) -> DomainResult<Option<RootCause>>;

    /// Operator action; the pipeline never calls this.
    async fn delete_root_cause(&self, id: Uuid) -> DomainResult<()>;

    async fn set_root_cause_embedding(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &EmbeddingMetadata,
    ) -> DomainResult<()>;

    /// Most recent link for a job, the authoritative one for reporting.
    async fn latest_link_for_job(&self, job_id: i64) -> DomainResult<Option<JobRootCauseLink>>;

    /// All links for a job, oldest first.
    async fn links_for_job(&self, job_id: i64) -> DomainResult<Vec<JobRootCauseLink>>;

    async fn list_root_causes(&self) -> DomainResult<Vec<RootCause>>;

    /// Count of jobs per detection method of their latest link.
    async fn detection_stats(&self) -> DomainResult<BTreeMap<String, u64>>;
}
