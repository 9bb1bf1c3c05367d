//! Storage for runs, jobs and their ingested evidence.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Annotation, FailedStep, JobRecord, WorkflowRun};

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn upsert_run(&self, run: &WorkflowRun) -> DomainResult<()>;

    async fn get_run(&self, run_id: i64) -> DomainResult<Option<WorkflowRun>>;

    /// Insert or update a job. Log state is only overwritten by
    /// [`JobRepository::set_log_state`].
    async fn upsert_job(&self, job: &JobRecord) -> DomainResult<()>;

    async fn get_job(&self, job_id: i64) -> DomainResult<Option<JobRecord>>;

    async fn jobs_for_run(&self, run_id: i64) -> DomainResult<Vec<JobRecord>>;

    /// Store annotations keyed by position. Already stored positions are
    /// left untouched. Returns the annotations with their storage ids.
    async fn store_annotations(
        &self,
        job_id: i64,
        annotations: &[Annotation],
    ) -> DomainResult<Vec<Annotation>>;

    async fn load_annotations(&self, job_id: i64) -> DomainResult<Vec<Annotation>>;

    /// Store failed steps keyed by position, ignoring already stored ones.
    async fn store_steps(&self, job_id: i64, steps: &[FailedStep]) -> DomainResult<()>;

    async fn load_steps(&self, job_id: i64) -> DomainResult<Vec<FailedStep>>;

    /// Whether annotations or steps were already ingested for the job.
    async fn has_evidence(&self, job_id: i64) -> DomainResult<bool>;

    async fn set_log_state(
        &self,
        job_id: i64,
        accessible: bool,
        log_file_path: Option<&str>,
    ) -> DomainResult<()>;

    async fn mark_run_processed(&self, run_id: i64) -> DomainResult<()>;

    /// Jobs of processed runs whose logs were unreachable.
    async fn jobs_without_logs(&self) -> DomainResult<Vec<JobRecord>>;
}
