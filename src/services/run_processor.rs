//! Run-level orchestration: ingest evidence, classify each failed job, and
//! report efficiency metrics.
//!
//! Each job is its own unit of work. A storage error while classifying one
//! job is recorded in the report and processing moves on to its siblings.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::classifier::{ClassifyOptions, RootCauseClassifier};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ClassificationResult, ClassificationStatus, JobEvidence, JobRecord, MoreInfoRequest, WorkflowRun,
};
use crate::domain::ports::{EvidenceSource, JobRepository, KnowledgeStore};

/// Bounds on the `need_more_info` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpPolicy {
    pub max_attempts: u32,
    /// Excerpt multiplier applied on every follow-up.
    pub growth: usize,
}

impl Default for FollowUpPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            growth: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyMetrics {
    pub jobs: u64,
    pub resolved: u64,
    pub resolved_without_logs: u64,
    pub resolved_without_llm: u64,
    pub llm_calls: u64,
    pub llm_tokens: u64,
}

impl EfficiencyMetrics {
    fn record(&mut self, result: &ClassificationResult) {
        self.jobs += 1;
        if result.llm_invoked {
            self.llm_calls += 1;
        }
        self.llm_tokens += result.llm_tokens;
        if result.status.is_resolved() {
            self.resolved += 1;
            if !result.full_log_requested {
                self.resolved_without_logs += 1;
            }
            if !result.llm_invoked {
                self.resolved_without_llm += 1;
            }
        }
    }

    /// Fraction of resolved jobs that never needed a log download.
    pub fn without_logs_ratio(&self) -> f64 {
        ratio(self.resolved_without_logs, self.resolved)
    }

    /// Fraction of resolved jobs that cost no LLM call.
    pub fn without_llm_ratio(&self) -> f64 {
        ratio(self.resolved_without_llm, self.resolved)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub job_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// None for reprocessing passes that span runs.
    pub run_id: Option<i64>,
    pub results: Vec<ClassificationResult>,
    pub failures: Vec<JobFailure>,
    pub by_status: BTreeMap<String, u64>,
    pub metrics: EfficiencyMetrics,
}

impl RunReport {
    fn new(run_id: Option<i64>) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    fn record(&mut self, result: ClassificationResult) {
        *self.by_status.entry(result.status.to_string()).or_insert(0) += 1;
        self.metrics.record(&result);
        self.results.push(result);
    }

    fn record_failure(&mut self, job_id: i64, err: &DomainError) {
        self.failures.push(JobFailure {
            job_id,
            error: err.to_string(),
        });
    }
}

pub struct RunProcessor {
    classifier: Arc<RootCauseClassifier>,
    jobs: Arc<dyn JobRepository>,
    knowledge: Arc<dyn KnowledgeStore>,
    follow_up: FollowUpPolicy,
}

impl RunProcessor {
    pub fn new(
        classifier: Arc<RootCauseClassifier>,
        jobs: Arc<dyn JobRepository>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            classifier,
            jobs,
            knowledge,
            follow_up: FollowUpPolicy::default(),
        }
    }

    pub fn with_follow_up(mut self, follow_up: FollowUpPolicy) -> Self {
        self.follow_up = follow_up;
        self
    }

    /// Store a run and its failed jobs, then classify each job in order.
    pub async fn process_run(
        &self,
        run: &WorkflowRun,
        jobs: &[JobRecord],
        source: &dyn EvidenceSource,
    ) -> DomainResult<RunReport> {
        self.jobs.upsert_run(run).await?;
        let mut report = RunReport::new(Some(run.id));

        for job in jobs {
            match self.process_job(run, job, source).await {
                Ok(result) => report.record(result),
                Err(e) => {
                    error!(job_id = job.id, run_id = run.id, error = %e, "job classification aborted");
                    report.record_failure(job.id, &e);
                }
            }
        }

        self.jobs.mark_run_processed(run.id).await?;
        info!(
            run_id = run.id,
            jobs = report.metrics.jobs,
            resolved = report.metrics.resolved,
            failures = report.failures.len(),
            "run processed"
        );
        Ok(report)
    }

    async fn process_job(
        &self,
        run: &WorkflowRun,
        job: &JobRecord,
        source: &dyn EvidenceSource,
    ) -> DomainResult<ClassificationResult> {
        self.jobs.upsert_job(job).await?;
        // Re-read so log state recorded by an earlier pass is honoured.
        let stored = self.jobs.get_job(job.id).await?.ok_or(DomainError::JobNotFound(job.id))?;
        let evidence = self.ingest_evidence(run, stored, source).await?;
        self.classify_with_follow_up(&evidence, source).await
    }

    /// Annotations and steps are fetched and stored once per job.
    async fn ingest_evidence(
        &self,
        run: &WorkflowRun,
        job: JobRecord,
        source: &dyn EvidenceSource,
    ) -> DomainResult<JobEvidence> {
        if self.jobs.has_evidence(job.id).await? {
            return self.stored_evidence(run.clone(), job).await;
        }

        let annotations = source.fetch_error_annotations(job.id).await.unwrap_or_else(|e| {
            warn!(job_id = job.id, error = %e, "annotations unavailable");
            Vec::new()
        });
        let steps = source.fetch_failed_steps(&job).await.unwrap_or_else(|e| {
            warn!(job_id = job.id, error = %e, "failed steps unavailable");
            Vec::new()
        });

        let annotations = self.jobs.store_annotations(job.id, &annotations).await?;
        self.jobs.store_steps(job.id, &steps).await?;
        Ok(JobEvidence {
            run: run.clone(),
            job,
            annotations,
            failed_steps: steps,
        })
    }

    async fn stored_evidence(&self, run: WorkflowRun, job: JobRecord) -> DomainResult<JobEvidence> {
        let annotations = self.jobs.load_annotations(job.id).await?;
        let failed_steps = self.jobs.load_steps(job.id).await?;
        Ok(JobEvidence {
            run,
            job,
            annotations,
            failed_steps,
        })
    }

    /// Classify, re-asking with a larger excerpt while the oracle wants more
    /// evidence and attempts remain.
    pub async fn classify_with_follow_up(
        &self,
        evidence: &JobEvidence,
        source: &dyn EvidenceSource,
    ) -> DomainResult<ClassificationResult> {
        let mut options = ClassifyOptions::default();
        let mut lines = self.classifier.settings().full_log_lines;
        let mut result = self.classifier.classify(evidence, source, &options).await?;
        let mut attempts = 0;
        let mut current = evidence.clone();

        while result.status == ClassificationStatus::LlmNeedMoreInfo && attempts < self.follow_up.max_attempts {
            attempts += 1;
            lines = lines
                .saturating_mul(self.follow_up.growth.max(1))
                .max(result.requested_lines.unwrap_or(0));

            // Pick up the log path stored by the previous attempt.
            if let Some(job) = self.jobs.get_job(current.job.id).await? {
                current.job = job;
            }
            options = ClassifyOptions {
                log_lines: Some(lines),
                follow_up: result.more_info_request.take().map(|request| MoreInfoRequest {
                    request,
                    lines: result.requested_lines,
                }),
                full_log_sought: options.full_log_sought || result.full_log_requested,
            };
            info!(job_id = current.job.id, attempt = attempts, lines, "following up on request for more evidence");

            let previous_tokens = result.llm_tokens;
            result = self.classifier.classify(&current, source, &options).await?;
            result.llm_tokens += previous_tokens;
        }

        Ok(result)
    }

    /// Re-classify processed jobs whose logs were unavailable and that still
    /// lack a trustworthy root cause. Stored evidence is reused.
    pub async fn reprocess(&self, source: &dyn EvidenceSource) -> DomainResult<RunReport> {
        let mut report = RunReport::new(None);
        let policy = *self.classifier.evidence_policy();

        for job in self.jobs.jobs_without_logs().await? {
            let latest = self.knowledge.latest_link_for_job(job.id).await?;
            if !policy.qualifies_for_reprocessing(&job, latest.as_ref()) {
                continue;
            }

            let job_id = job.id;
            match self.reprocess_job(job, source).await {
                Ok(result) => report.record(result),
                Err(e) => {
                    error!(job_id, error = %e, "reprocessing aborted");
                    report.record_failure(job_id, &e);
                }
            }
        }

        info!(jobs = report.metrics.jobs, resolved = report.metrics.resolved, "reprocessing finished");
        Ok(report)
    }

    async fn reprocess_job(&self, job: JobRecord, source: &dyn EvidenceSource) -> DomainResult<ClassificationResult> {
        let run = self
            .jobs
            .get_run(job.run_id)
            .await?
            .ok_or_else(|| DomainError::ExecutionFailed(format!("run {} missing for job {}", job.run_id, job.id)))?;
        let evidence = self.stored_evidence(run, job).await?;
        self.classify_with_follow_up(&evidence, source).await
    }
}
