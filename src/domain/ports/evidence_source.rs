//! Evidence source port.
//!
//! The CI provider side of the pipeline: where annotations, failed steps and
//! logs come from. Every method is best effort; missing evidence degrades the
//! classification instead of failing it.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Annotation, FailedStep, JobRecord};

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Error annotations attached to a job.
    async fn fetch_error_annotations(&self, job_id: i64) -> DomainResult<Vec<Annotation>>;

    /// Steps of the job that did not succeed.
    async fn fetch_failed_steps(&self, job: &JobRecord) -> DomainResult<Vec<FailedStep>>;

    /// Last `line_count` lines of the job log, or an empty string when no
    /// log is available.
    async fn fetch_log_excerpt(&self, job_id: i64, line_count: usize) -> DomainResult<String>;

    /// Make the full job log available locally. `None` means the log cannot
    /// be obtained.
    async fn fetch_full_log(&self, job: &JobRecord) -> DomainResult<Option<PathBuf>>;
}
