//! Workflow runs, jobs and the failure evidence attached to them.
//!
//! Runs and jobs are owned by the CI provider; the pipeline only records the
//! fields it needs to decide how much evidence to acquire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A CI workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    pub repository: String,
    pub workflow_name: String,
    #[serde(default)]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub head_sha: Option<String>,
    /// Set once every job of the run has been through the pipeline.
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

/// A job inside a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    /// False once a full-log download was attempted and failed.
    #[serde(default = "default_true")]
    pub logs_accessible: bool,
    /// Local path of the downloaded full log, if any.
    #[serde(default)]
    pub log_file_path: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl JobRecord {
    pub fn new(id: i64, run_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            run_id,
            name: name.into(),
            conclusion: Some("failure".to_string()),
            logs_accessible: true,
            log_file_path: None,
        }
    }
}

/// An error annotation emitted by the CI provider for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Storage id, set once the annotation has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub start_line: Option<u32>,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub level: Option<String>,
    /// Provider payload as received. Never forwarded to the LLM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl Annotation {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A step of a job that did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedStep {
    pub name: String,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default = "default_step_status")]
    pub status: String,
}

fn default_step_status() -> String {
    "failure".to_string()
}

impl FailedStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: None,
            status: default_step_status(),
        }
    }
}

/// The cheap evidence available for a job before any log is downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvidence {
    pub run: WorkflowRun,
    pub job: JobRecord,
    pub annotations: Vec<Annotation>,
    pub failed_steps: Vec<FailedStep>,
}
