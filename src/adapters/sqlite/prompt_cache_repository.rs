//! SQLite implementation of the PromptCacheRepository.
//!
//! Similarity search is a full scan over resolved entries with cosine
//! similarity computed in Rust.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::cmp::Ordering;
use uuid::Uuid;

use super::{
    bytes_to_embedding, cosine_similarity, embedding_to_bytes, parse_datetime,
    parse_json_or_default, parse_optional_datetime, parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CacheOutcome, DiscoveryMethod, NewPromptCacheEntry, PromptCacheEntry, PromptCacheStats,
    SimilarEntry,
};
use crate::domain::ports::PromptCacheRepository;

const ENTRY_COLUMNS: &str = "p.id, p.content_hash, p.context_text, p.embedding, p.embedding_model, p.job_id, \
     p.linked_annotation_ids, p.linked_step_names, p.root_cause_id, p.confidence, p.llm_model, \
     p.llm_response, p.llm_tokens, p.duration_ms, p.reuse_count, p.last_reused_at, p.created_at";

#[derive(Clone)]
pub struct SqlitePromptCacheRepository {
    pool: SqlitePool,
}

impl SqlitePromptCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromptCacheRepository for SqlitePromptCacheRepository {
    async fn find_by_hash(&self, content_hash: &str) -> DomainResult<Option<PromptCacheEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM prompt_cache p WHERE p.content_hash = ?");
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<PromptCacheEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM prompt_cache p WHERE p.id = ?");
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn save(&self, entry: NewPromptCacheEntry) -> DomainResult<PromptCacheEntry> {
        let entry = entry.into_entry();
        let annotation_ids = serde_json::to_string(&entry.linked_annotation_ids)?;
        let step_names = serde_json::to_string(&entry.linked_step_names)?;

        sqlx::query(
            r#"INSERT INTO prompt_cache (id, content_hash, context_text, embedding, embedding_model, job_id,
                   linked_annotation_ids, linked_step_names, reuse_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
               ON CONFLICT(content_hash) DO NOTHING"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.content_hash)
        .bind(&entry.context_text)
        .bind(embedding_to_bytes(&entry.embedding))
        .bind(&entry.embedding_model)
        .bind(entry.job_id)
        .bind(&annotation_ids)
        .bind(&step_names)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_hash(&entry.content_hash).await?.ok_or_else(|| {
            DomainError::DatabaseError(format!(
                "prompt cache entry {} vanished after insert",
                entry.content_hash
            ))
        })
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> DomainResult<Vec<SimilarEntry>> {
        let sql = format!(
            r#"SELECT {ENTRY_COLUMNS}, r.discovery_method, r.category AS root_cause_category, r.title AS root_cause_title
               FROM prompt_cache p
               JOIN root_causes r ON r.id = p.root_cause_id
               WHERE p.embedding IS NOT NULL"#
        );
        let rows: Vec<SimilarRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut hits = Vec::new();
        for row in rows {
            let discovery_method = DiscoveryMethod::from_str(&row.discovery_method).ok_or_else(|| {
                DomainError::SerializationError(format!("Invalid discovery method: {}", row.discovery_method))
            })?;
            let entry: PromptCacheEntry = row.entry.try_into()?;
            let similarity = cosine_similarity(embedding, &entry.embedding);
            if similarity >= threshold {
                hits.push(SimilarEntry {
                    entry,
                    similarity,
                    discovery_method,
                    root_cause_category: row.root_cause_category,
                    root_cause_title: row.root_cause_title,
                });
            }
        }

        hits.sort_by(rank_similar);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn mark_reused(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE prompt_cache SET reuse_count = reuse_count + 1, last_reused_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::CacheEntryNotFound(id));
        }

        Ok(())
    }

    async fn attach_outcome(&self, id: Uuid, outcome: &CacheOutcome) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE prompt_cache SET llm_model = ?, llm_response = ?, llm_tokens = ?, duration_ms = ?,
                   root_cause_id = ?, confidence = ?
               WHERE id = ?"#,
        )
        .bind(&outcome.model)
        .bind(&outcome.response)
        .bind(outcome.tokens as i64)
        .bind(outcome.duration_ms as i64)
        .bind(outcome.root_cause_id.map(|id| id.to_string()))
        .bind(outcome.confidence)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::CacheEntryNotFound(id));
        }

        Ok(())
    }

    async fn stats(&self) -> DomainResult<PromptCacheStats> {
        let (entries, resolved, total_reuses): (i64, i64, i64) = sqlx::query_as(
            r#"SELECT COUNT(*),
                      COALESCE(SUM(CASE WHEN root_cause_id IS NOT NULL THEN 1 ELSE 0 END), 0),
                      COALESCE(SUM(reuse_count), 0)
               FROM prompt_cache"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PromptCacheStats {
            entries: entries as u64,
            resolved: resolved as u64,
            total_reuses: total_reuses as u64,
        })
    }
}

/// Similarity desc, then reuse count desc, then most recently reused first.
/// Entries never reused sort after reused ones.
fn rank_similar(a: &SimilarEntry, b: &SimilarEntry) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entry.reuse_count.cmp(&a.entry.reuse_count))
        .then_with(|| b.entry.last_reused_at.cmp(&a.entry.last_reused_at))
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    content_hash: String,
    context_text: String,
    embedding: Option<Vec<u8>>,
    embedding_model: Option<String>,
    job_id: i64,
    linked_annotation_ids: Option<String>,
    linked_step_names: Option<String>,
    root_cause_id: Option<String>,
    confidence: Option<f64>,
    llm_model: Option<String>,
    llm_response: Option<String>,
    llm_tokens: Option<i64>,
    duration_ms: Option<i64>,
    reuse_count: i64,
    last_reused_at: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct SimilarRow {
    #[sqlx(flatten)]
    entry: EntryRow,
    discovery_method: String,
    root_cause_category: String,
    root_cause_title: String,
}

impl TryFrom<EntryRow> for PromptCacheEntry {
    type Error = DomainError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let embedding = match row.embedding {
            Some(bytes) => bytes_to_embedding(&bytes)?,
            None => Vec::new(),
        };

        Ok(PromptCacheEntry {
            id: parse_uuid(&row.id)?,
            content_hash: row.content_hash,
            context_text: row.context_text,
            embedding,
            embedding_model: row.embedding_model,
            job_id: row.job_id,
            linked_annotation_ids: parse_json_or_default(row.linked_annotation_ids)?,
            linked_step_names: parse_json_or_default(row.linked_step_names)?,
            root_cause_id: parse_optional_uuid(row.root_cause_id)?,
            confidence: row.confidence,
            llm_model: row.llm_model,
            llm_response: row.llm_response,
            llm_tokens: row.llm_tokens.map(|t| t as u64),
            duration_ms: row.duration_ms.map(|d| d as u64),
            reuse_count: row.reuse_count as u64,
            last_reused_at: parse_optional_datetime(row.last_reused_at)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
