//! SQLite implementation of the KnowledgeStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{bytes_to_embedding, embedding_to_bytes, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Detection, DetectionMethod, DiscoveryMethod, EmbeddingMetadata, FoundRootCause,
    JobRootCauseLink, RootCause, RootCauseCandidate,
};
use crate::domain::ports::KnowledgeStore;

const ROOT_CAUSE_COLUMNS: &str = "id, category, title, description, suggested_fix, confidence_threshold, \
     occurrence_count, discovery_method, embedding, embedding_metadata, last_seen_at, created_at, updated_at";

const LINK_COLUMNS: &str = "id, job_id, root_cause_id, confidence, detection_method, llm_model, \
     llm_tokens, duration_ms, raw_analysis, created_at";

#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_by_key(&self, category: &str, title: &str) -> DomainResult<Option<RootCause>> {
        let sql = format!("SELECT {ROOT_CAUSE_COLUMNS} FROM root_causes WHERE category = ? AND title = ?");
        let row: Option<RootCauseRow> = sqlx::query_as(&sql)
            .bind(category)
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn find_or_create_root_cause(
        &self,
        candidate: &RootCauseCandidate,
    ) -> DomainResult<FoundRootCause> {
        candidate.validate().map_err(DomainError::ValidationFailed)?;
        let fresh = RootCause::from_candidate(candidate);

        let result = sqlx::query(
            r#"INSERT INTO root_causes (id, category, title, description, suggested_fix, confidence_threshold,
                   occurrence_count, discovery_method, last_seen_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(category, title) DO NOTHING"#,
        )
        .bind(fresh.id.to_string())
        .bind(&fresh.category)
        .bind(&fresh.title)
        .bind(&fresh.description)
        .bind(&fresh.suggested_fix)
        .bind(fresh.confidence_threshold)
        .bind(fresh.occurrence_count as i64)
        .bind(fresh.discovery_method.as_str())
        .bind(fresh.last_seen_at.to_rfc3339())
        .bind(fresh.created_at.to_rfc3339())
        .bind(fresh.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let root_cause = self
            .get_by_key(&fresh.category, &fresh.title)
            .await?
            .ok_or_else(|| {
                DomainError::DatabaseError(format!(
                    "root cause ({}, {}) vanished after upsert",
                    fresh.category, fresh.title
                ))
            })?;

        Ok(FoundRootCause { root_cause, created })
    }

    async fn link_job(
        &self,
        job_id: i64,
        root_cause_id: Option<Uuid>,
        detection: &Detection,
    ) -> DomainResult<JobRootCauseLink> {
        let link = JobRootCauseLink::new(job_id, root_cause_id, detection.clone());

        sqlx::query(
            r#"INSERT INTO job_root_causes (id, job_id, root_cause_id, confidence, detection_method,
                   llm_model, llm_tokens, duration_ms, raw_analysis, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(link.id.to_string())
        .bind(link.job_id)
        .bind(link.root_cause_id.map(|id| id.to_string()))
        .bind(link.detection.confidence)
        .bind(link.detection.method.as_str())
        .bind(&link.detection.llm_model)
        .bind(link.detection.llm_tokens.map(|t| t as i64))
        .bind(link.detection.duration_ms.map(|d| d as i64))
        .bind(&link.detection.raw_analysis)
        .bind(link.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(link)
    }

    async fn bump_occurrence(&self, root_cause_id: Option<Uuid>) -> DomainResult<()> {
        let Some(id) = root_cause_id else {
            return Ok(());
        };

        sqlx::query(
            "UPDATE root_causes SET occurrence_count = occurrence_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_last_seen(&self, root_cause_id: Option<Uuid>) -> DomainResult<()> {
        let Some(id) = root_cause_id else {
            return Ok(());
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE root_causes SET last_seen_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_root_cause_by_id(&self, id: Uuid) -> DomainResult<Option<RootCause>> {
        let sql = format!("SELECT {ROOT_CAUSE_COLUMNS} FROM root_causes WHERE id = ?");
        let row: Option<RootCauseRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn delete_root_cause(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM root_causes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RootCauseNotFound(id));
        }

        Ok(())
    }

    async fn set_root_cause_embedding(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &EmbeddingMetadata,
    ) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(metadata)?;
        let result = sqlx::query(
            "UPDATE root_causes SET embedding = ?, embedding_metadata = ?, updated_at = ? WHERE id = ?",
        )
        .bind(embedding_to_bytes(embedding))
        .bind(&metadata_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RootCauseNotFound(id));
        }

        Ok(())
    }

    async fn latest_link_for_job(&self, job_id: i64) -> DomainResult<Option<JobRootCauseLink>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM job_root_causes WHERE job_id = ? ORDER BY rowid DESC LIMIT 1"
        );
        let row: Option<LinkRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn links_for_job(&self, job_id: i64) -> DomainResult<Vec<JobRootCauseLink>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM job_root_causes WHERE job_id = ? ORDER BY rowid ASC");
        let rows: Vec<LinkRow> = sqlx::query_as(&sql).bind(job_id).fetch_all(&self.pool).await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_root_causes(&self) -> DomainResult<Vec<RootCause>> {
        let sql = format!(
            "SELECT {ROOT_CAUSE_COLUMNS} FROM root_causes ORDER BY occurrence_count DESC, category, title"
        );
        let rows: Vec<RootCauseRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn detection_stats(&self) -> DomainResult<BTreeMap<String, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT l.detection_method, COUNT(*)
               FROM job_root_causes l
               WHERE l.rowid = (
                   SELECT l2.rowid FROM job_root_causes l2
                   WHERE l2.job_id = l.job_id
                   ORDER BY l2.rowid DESC LIMIT 1
               )
               GROUP BY l.detection_method"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(method, count)| (method, count as u64)).collect())
    }
}

#[derive(sqlx::FromRow)]
struct RootCauseRow {
    id: String,
    category: String,
    title: String,
    description: String,
    suggested_fix: Option<String>,
    confidence_threshold: f64,
    occurrence_count: i64,
    discovery_method: String,
    embedding: Option<Vec<u8>>,
    embedding_metadata: Option<String>,
    last_seen_at: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RootCauseRow> for RootCause {
    type Error = DomainError;

    fn try_from(row: RootCauseRow) -> Result<Self, Self::Error> {
        let discovery_method = DiscoveryMethod::from_str(&row.discovery_method).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid discovery method: {}", row.discovery_method))
        })?;
        let embedding = row.embedding.as_deref().map(bytes_to_embedding).transpose()?;
        let embedding_metadata = row
            .embedding_metadata
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        Ok(RootCause {
            id: parse_uuid(&row.id)?,
            category: row.category,
            title: row.title,
            description: row.description,
            suggested_fix: row.suggested_fix,
            confidence_threshold: row.confidence_threshold,
            occurrence_count: row.occurrence_count as u64,
            discovery_method,
            embedding,
            embedding_metadata,
            last_seen_at: parse_datetime(&row.last_seen_at)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: String,
    job_id: i64,
    root_cause_id: Option<String>,
    confidence: f64,
    detection_method: String,
    llm_model: Option<String>,
    llm_tokens: Option<i64>,
    duration_ms: Option<i64>,
    raw_analysis: Option<String>,
    created_at: String,
}

impl TryFrom<LinkRow> for JobRootCauseLink {
    type Error = DomainError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        let method = DetectionMethod::from_str(&row.detection_method).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid detection method: {}", row.detection_method))
        })?;

        Ok(JobRootCauseLink {
            id: parse_uuid(&row.id)?,
            job_id: row.job_id,
            root_cause_id: parse_optional_uuid(row.root_cause_id)?,
            detection: Detection {
                method,
                confidence: row.confidence,
                llm_model: row.llm_model,
                llm_tokens: row.llm_tokens.map(|t| t as u64),
                duration_ms: row.duration_ms.map(|d| d as u64),
                raw_analysis: row.raw_analysis,
            },
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteJobRepository};
    use crate::domain::models::{JobRecord, WorkflowRun};
    use crate::domain::ports::JobRepository;

    async fn setup() -> (SqliteKnowledgeStore, SqlitePool) {
        let pool = create_migrated_test_pool().await.unwrap();
        let jobs = SqliteJobRepository::new(pool.clone());
        jobs.upsert_run(&WorkflowRun {
            id: 1,
            repository: "acme/widgets".to_string(),
            workflow_name: "CI".to_string(),
            head_branch: None,
            head_sha: None,
            processed_at: None,
        })
        .await
        .unwrap();
        jobs.upsert_job(&JobRecord::new(11, 1, "build")).await.unwrap();
        (SqliteKnowledgeStore::new(pool.clone()), pool)
    }

    fn candidate(title: &str) -> RootCauseCandidate {
        RootCauseCandidate::new(
            "dependency_missing",
            title,
            "npm could not resolve the dependency tree",
            Some("Pin the peer dependency".to_string()),
            0.9,
            DiscoveryMethod::Pattern,
        )
    }

    #[tokio::test]
    async fn test_find_or_create_is_insert_or_fetch() {
        let (store, _pool) = setup().await;

        let first = store.find_or_create_root_cause(&candidate("NPM Install Failed")).await.unwrap();
        assert!(first.created);
        assert_eq!(first.root_cause.occurrence_count, 1);

        let second = store.find_or_create_root_cause(&candidate("NPM Install Failed")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.root_cause.id, first.root_cause.id);
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_yields_one_row() {
        let (store, _pool) = setup().await;
        let c = candidate("Concurrent");

        let (a, b) = tokio::join!(
            store.find_or_create_root_cause(&c),
            store.find_or_create_root_cause(&c)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.root_cause.id, b.root_cause.id);
        assert!(a.created ^ b.created);
        assert_eq!(store.list_root_causes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bump_and_touch() {
        let (store, _pool) = setup().await;
        let rc = store.find_or_create_root_cause(&candidate("Bump")).await.unwrap().root_cause;

        store.bump_occurrence(Some(rc.id)).await.unwrap();
        store.touch_last_seen(Some(rc.id)).await.unwrap();
        let updated = store.get_root_cause_by_id(rc.id).await.unwrap().unwrap();
        assert_eq!(updated.occurrence_count, 2);
        assert!(updated.last_seen_at >= rc.last_seen_at);

        // Null and missing ids are no-ops
        store.bump_occurrence(None).await.unwrap();
        store.touch_last_seen(None).await.unwrap();
        store.bump_occurrence(Some(Uuid::new_v4())).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_cause_is_none() {
        let (store, _pool) = setup().await;
        assert!(store.get_root_cause_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_links_are_append_only_and_latest_wins() {
        let (store, _pool) = setup().await;
        let rc = store.find_or_create_root_cause(&candidate("Links")).await.unwrap().root_cause;

        store
            .link_job(11, None, &Detection::new(DetectionMethod::LlmMalformed, 0.0))
            .await
            .unwrap();
        store
            .link_job(11, Some(rc.id), &Detection::new(DetectionMethod::Pattern, 0.9))
            .await
            .unwrap();

        let links = store.links_for_job(11).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].detection.method, DetectionMethod::LlmMalformed);

        let latest = store.latest_link_for_job(11).await.unwrap().unwrap();
        assert_eq!(latest.root_cause_id, Some(rc.id));

        let stats = store.detection_stats().await.unwrap();
        assert_eq!(stats.get("pattern"), Some(&1));
        assert!(!stats.contains_key("llm_malformed"));
    }

    #[tokio::test]
    async fn test_delete_nulls_links() {
        let (store, _pool) = setup().await;
        let rc = store.find_or_create_root_cause(&candidate("Deleted")).await.unwrap().root_cause;
        store
            .link_job(11, Some(rc.id), &Detection::new(DetectionMethod::Pattern, 0.9))
            .await
            .unwrap();

        store.delete_root_cause(rc.id).await.unwrap();
        let latest = store.latest_link_for_job(11).await.unwrap().unwrap();
        assert!(latest.root_cause_id.is_none());
        assert!(matches!(
            store.delete_root_cause(rc.id).await,
            Err(DomainError::RootCauseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_round_trip() {
        let (store, _pool) = setup().await;
        let rc = store.find_or_create_root_cause(&candidate("Embedded")).await.unwrap().root_cause;
        let metadata = EmbeddingMetadata {
            provider: "hashing".to_string(),
            model: "fnv-hashing".to_string(),
            dimensions: 3,
            generated_at: Utc::now(),
        };

        store.set_root_cause_embedding(rc.id, &[0.1, 0.2, 0.3], &metadata).await.unwrap();
        let loaded = store.get_root_cause_by_id(rc.id).await.unwrap().unwrap();
        assert_eq!(loaded.embedding, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(loaded.embedding_metadata.map(|m| m.dimensions), Some(3));
    }
}
