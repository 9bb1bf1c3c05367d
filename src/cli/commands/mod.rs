//! Subcommand implementations.

pub mod classify;
pub mod init;
pub mod patterns;
pub mod reprocess;
pub mod stats;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::context::AppContext;
use crate::cli::output::{percent, table, truncate, CommandOutput};
use crate::domain::ports::KnowledgeStore;
use crate::services::{EfficiencyMetrics, JobFailure, RunReport};

/// One classified job, with the root cause resolved to its title.
#[derive(Debug, Serialize)]
pub struct JobRow {
    pub job_id: i64,
    pub status: String,
    pub method: Option<String>,
    pub category: Option<String>,
    pub root_cause: Option<String>,
    pub confidence: Option<f64>,
    pub more_info_request: Option<String>,
}

/// Shared output of `classify` and `reprocess`.
#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub run_id: Option<i64>,
    pub jobs: Vec<JobRow>,
    pub failures: Vec<JobFailure>,
    pub by_status: BTreeMap<String, u64>,
    pub metrics: EfficiencyMetrics,
    pub resolved_without_logs_ratio: f64,
    pub resolved_without_llm_ratio: f64,
}

impl ReportOutput {
    pub async fn from_report(ctx: &AppContext, report: RunReport) -> Result<Self> {
        let mut jobs = Vec::with_capacity(report.results.len());
        for result in report.results {
            let cause = match result.root_cause_id {
                Some(id) => ctx.knowledge.get_root_cause_by_id(id).await?,
                None => None,
            };
            jobs.push(JobRow {
                job_id: result.job_id,
                status: result.status.to_string(),
                method: result.method.map(|m| m.to_string()),
                category: cause.as_ref().map(|c| c.category.clone()),
                root_cause: cause.map(|c| c.title),
                confidence: result.confidence,
                more_info_request: result.more_info_request,
            });
        }

        Ok(Self {
            run_id: report.run_id,
            jobs,
            failures: report.failures,
            by_status: report.by_status,
            resolved_without_logs_ratio: report.metrics.without_logs_ratio(),
            resolved_without_llm_ratio: report.metrics.without_llm_ratio(),
            metrics: report.metrics,
        })
    }
}

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        if self.jobs.is_empty() && self.failures.is_empty() {
            return "No jobs to classify.".to_string();
        }

        let mut table = table(&["Job", "Status", "Method", "Category", "Root cause", "Confidence"]);
        for job in &self.jobs {
            let cause = job
                .root_cause
                .as_deref()
                .or(job.more_info_request.as_deref())
                .map(|s| truncate(s, 60))
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(job.job_id),
                Cell::new(&job.status),
                Cell::new(job.method.as_deref().unwrap_or("-")),
                Cell::new(job.category.as_deref().unwrap_or("-")),
                Cell::new(cause),
                Cell::new(job.confidence.map_or_else(|| "-".to_string(), |c| format!("{c:.2}"))),
            ]);
        }

        let mut lines = Vec::new();
        if let Some(run_id) = self.run_id {
            lines.push(format!("Run {run_id}"));
        }
        lines.push(table.to_string());

        for failure in &self.failures {
            lines.push(format!("Job {} failed: {}", failure.job_id, failure.error));
        }

        let m = &self.metrics;
        lines.push(format!(
            "Resolved {}/{} jobs ({} without logs, {} without LLM). LLM calls: {}, tokens: {}",
            m.resolved,
            m.jobs,
            percent(self.resolved_without_logs_ratio),
            percent(self.resolved_without_llm_ratio),
            m.llm_calls,
            m.llm_tokens
        ));
        lines.join("\n")
    }
}
