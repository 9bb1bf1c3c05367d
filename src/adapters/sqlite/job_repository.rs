//! SQLite implementation of the JobRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::parse_optional_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Annotation, FailedStep, JobRecord, WorkflowRun};
use crate::domain::ports::JobRepository;

#[derive(Clone)]
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn upsert_run(&self, run: &WorkflowRun) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workflow_runs (id, repository, workflow_name, head_branch, head_sha)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   repository = excluded.repository,
                   workflow_name = excluded.workflow_name,
                   head_branch = excluded.head_branch,
                   head_sha = excluded.head_sha"#,
        )
        .bind(run.id)
        .bind(&run.repository)
        .bind(&run.workflow_name)
        .bind(&run.head_branch)
        .bind(&run.head_sha)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_run(&self, run_id: i64) -> DomainResult<Option<WorkflowRun>> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT id, repository, workflow_name, head_branch, head_sha, processed_at FROM workflow_runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn upsert_job(&self, job: &JobRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO jobs (id, run_id, name, conclusion, logs_accessible, log_file_path)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   conclusion = excluded.conclusion"#,
        )
        .bind(job.id)
        .bind(job.run_id)
        .bind(&job.name)
        .bind(&job.conclusion)
        .bind(job.logs_accessible)
        .bind(&job.log_file_path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, job_id: i64) -> DomainResult<Option<JobRecord>> {
        let row: Option<JobRow> = sqlx::query_as(
            "SELECT id, run_id, name, conclusion, logs_accessible, log_file_path FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn jobs_for_run(&self, run_id: i64) -> DomainResult<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT id, run_id, name, conclusion, logs_accessible, log_file_path FROM jobs WHERE run_id = ? ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn store_annotations(
        &self,
        job_id: i64,
        annotations: &[Annotation],
    ) -> DomainResult<Vec<Annotation>> {
        let mut tx = self.pool.begin().await?;
        for (ordinal, annotation) in annotations.iter().enumerate() {
            let raw = annotation.raw.as_ref().map(serde_json::to_string).transpose()?;
            sqlx::query(
                r#"INSERT OR IGNORE INTO job_annotations
                       (job_id, ordinal, message, title, path, start_line, end_line, level, raw)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(job_id)
            .bind(ordinal as i64)
            .bind(&annotation.message)
            .bind(&annotation.title)
            .bind(&annotation.path)
            .bind(annotation.start_line)
            .bind(annotation.end_line)
            .bind(&annotation.level)
            .bind(raw)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.load_annotations(job_id).await
    }

    async fn load_annotations(&self, job_id: i64) -> DomainResult<Vec<Annotation>> {
        let rows: Vec<AnnotationRow> = sqlx::query_as(
            r#"SELECT id, message, title, path, start_line, end_line, level, raw
               FROM job_annotations WHERE job_id = ? ORDER BY ordinal"#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn store_steps(&self, job_id: i64, steps: &[FailedStep]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for (ordinal, step) in steps.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO job_steps (job_id, ordinal, name, number, status) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(job_id)
            .bind(ordinal as i64)
            .bind(&step.name)
            .bind(step.number)
            .bind(&step.status)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn load_steps(&self, job_id: i64) -> DomainResult<Vec<FailedStep>> {
        let rows: Vec<(String, Option<u32>, String)> = sqlx::query_as(
            "SELECT name, number, status FROM job_steps WHERE job_id = ? ORDER BY ordinal",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, number, status)| FailedStep { name, number, status })
            .collect())
    }

    async fn has_evidence(&self, job_id: i64) -> DomainResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT (SELECT COUNT(*) FROM job_annotations WHERE job_id = ?)
                    + (SELECT COUNT(*) FROM job_steps WHERE job_id = ?)"#,
        )
        .bind(job_id)
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn set_log_state(
        &self,
        job_id: i64,
        accessible: bool,
        log_file_path: Option<&str>,
    ) -> DomainResult<()> {
        let result = sqlx::query("UPDATE jobs SET logs_accessible = ?, log_file_path = ? WHERE id = ?")
            .bind(accessible)
            .bind(log_file_path)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::JobNotFound(job_id));
        }

        Ok(())
    }

    async fn mark_run_processed(&self, run_id: i64) -> DomainResult<()> {
        sqlx::query("UPDATE workflow_runs SET processed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn jobs_without_logs(&self) -> DomainResult<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"SELECT j.id, j.run_id, j.name, j.conclusion, j.logs_accessible, j.log_file_path
               FROM jobs j
               JOIN workflow_runs r ON r.id = j.run_id
               WHERE r.processed_at IS NOT NULL AND j.logs_accessible = 0
               ORDER BY j.run_id, j.id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    repository: String,
    workflow_name: String,
    head_branch: Option<String>,
    head_sha: Option<String>,
    processed_at: Option<String>,
}

impl TryFrom<RunRow> for WorkflowRun {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(WorkflowRun {
            id: row.id,
            repository: row.repository,
            workflow_name: row.workflow_name,
            head_branch: row.head_branch,
            head_sha: row.head_sha,
            processed_at: parse_optional_datetime(row.processed_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    run_id: i64,
    name: String,
    conclusion: Option<String>,
    logs_accessible: bool,
    log_file_path: Option<String>,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        JobRecord {
            id: row.id,
            run_id: row.run_id,
            name: row.name,
            conclusion: row.conclusion,
            logs_accessible: row.logs_accessible,
            log_file_path: row.log_file_path,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: i64,
    message: String,
    title: Option<String>,
    path: Option<String>,
    start_line: Option<u32>,
    end_line: Option<u32>,
    level: Option<String>,
    raw: Option<String>,
}

impl TryFrom<AnnotationRow> for Annotation {
    type Error = DomainError;

    fn try_from(row: AnnotationRow) -> Result<Self, Self::Error> {
        Ok(Annotation {
            id: Some(row.id),
            message: row.message,
            title: row.title,
            path: row.path,
            start_line: row.start_line,
            end_line: row.end_line,
            level: row.level,
            raw: row.raw.map(|json| serde_json::from_str(&json)).transpose()?,
        })
    }
}
