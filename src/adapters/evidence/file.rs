//! File-system evidence source.
//!
//! Annotations and failed steps come from a run manifest (JSON or YAML);
//! logs are read from `<logs_dir>/<job_id>.log`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{tail_lines, Annotation, FailedStep, JobRecord, WorkflowRun};
use crate::domain::ports::EvidenceSource;

/// A workflow run with its failed jobs, as exported from the CI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run: WorkflowRun,
    #[serde(default)]
    pub jobs: Vec<ManifestJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestJob {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default, alias = "steps")]
    pub failed_steps: Vec<FailedStep>,
}

impl RunManifest {
    /// Load a manifest, choosing the format from the file extension.
    pub fn load(path: &Path) -> DomainResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let manifest: Self = if is_json {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| DomainError::SerializationError(e.to_string()))?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.id) {
                return Err(DomainError::ValidationFailed(format!(
                    "job {} appears twice in run {}",
                    job.id, self.run.id
                )));
            }
        }
        Ok(())
    }

    /// Job records for every job in the manifest.
    pub fn job_records(&self) -> Vec<JobRecord> {
        self.jobs
            .iter()
            .map(|j| {
                let mut record = JobRecord::new(j.id, self.run.id, j.name.clone());
                record.conclusion.clone_from(&j.conclusion);
                if record.conclusion.is_none() {
                    record.conclusion = Some("failure".to_string());
                }
                record
            })
            .collect()
    }

    fn job(&self, job_id: i64) -> Option<&ManifestJob> {
        self.jobs.iter().find(|j| j.id == job_id)
    }
}

/// Evidence read from local files.
#[derive(Debug, Clone, Default)]
pub struct FileEvidenceSource {
    manifest: Option<RunManifest>,
    logs_dir: Option<PathBuf>,
}

impl FileEvidenceSource {
    pub fn new(logs_dir: Option<PathBuf>) -> Self {
        Self {
            manifest: None,
            logs_dir,
        }
    }

    pub fn with_manifest(mut self, manifest: RunManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    fn log_path(&self, job_id: i64) -> Option<PathBuf> {
        self.logs_dir
            .as_ref()
            .map(|dir| dir.join(format!("{job_id}.log")))
            .filter(|p| p.is_file())
    }
}

fn is_error_level(annotation: &Annotation) -> bool {
    annotation
        .level
        .as_deref()
        .is_none_or(|l| l.eq_ignore_ascii_case("failure") || l.eq_ignore_ascii_case("error"))
}

#[async_trait]
impl EvidenceSource for FileEvidenceSource {
    async fn fetch_error_annotations(&self, job_id: i64) -> DomainResult<Vec<Annotation>> {
        Ok(self
            .manifest
            .as_ref()
            .and_then(|m| m.job(job_id))
            .map(|j| j.annotations.iter().filter(|a| is_error_level(a)).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_failed_steps(&self, job: &JobRecord) -> DomainResult<Vec<FailedStep>> {
        Ok(self
            .manifest
            .as_ref()
            .and_then(|m| m.job(job.id))
            .map(|j| {
                j.failed_steps
                    .iter()
                    .filter(|s| s.status.eq_ignore_ascii_case("failure"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_log_excerpt(&self, job_id: i64, line_count: usize) -> DomainResult<String> {
        let Some(path) = self.log_path(job_id) else {
            return Ok(String::new());
        };
        let log = tokio::fs::read_to_string(&path).await?;
        Ok(tail_lines(&log, line_count))
    }

    async fn fetch_full_log(&self, job: &JobRecord) -> DomainResult<Option<PathBuf>> {
        Ok(self.log_path(job.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST_YAML: &str = r#"
run:
  id: 900
  repository: acme/widgets
  workflow_name: CI
jobs:
  - id: 901
    name: build
    annotations:
      - message: "npm ERR! code ERESOLVE"
        title: Install
      - message: "Node 16 is deprecated"
        level: warning
    steps:
      - name: Install dependencies
      - name: Checkout
        status: success
  - id: 902
    name: lint
"#;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = RunManifest::load(&write(&dir, "run.yaml", MANIFEST_YAML)).unwrap();

        assert_eq!(manifest.run.id, 900);
        assert_eq!(manifest.jobs.len(), 2);
        let records = manifest.job_records();
        assert_eq!(records[0].run_id, 900);
        assert_eq!(records[1].conclusion.as_deref(), Some("failure"));
    }

    #[test]
    fn test_load_json_manifest_and_reject_duplicates() {
        let dir = TempDir::new().unwrap();
        let json = r#"{"run":{"id":1,"repository":"r","workflow_name":"w"},"jobs":[{"id":5,"name":"a"},{"id":5,"name":"b"}]}"#;
        let err = RunManifest::load(&write(&dir, "run.json", json)).unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_filters_to_error_evidence() {
        let dir = TempDir::new().unwrap();
        let manifest = RunManifest::load(&write(&dir, "run.yaml", MANIFEST_YAML)).unwrap();
        let source = FileEvidenceSource::new(None).with_manifest(manifest);

        let annotations = source.fetch_error_annotations(901).await.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].title.as_deref(), Some("Install"));

        let steps = source.fetch_failed_steps(&JobRecord::new(901, 900, "build")).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "Install dependencies");

        assert!(source.fetch_error_annotations(12345).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logs_from_directory() {
        let dir = TempDir::new().unwrap();
        write(&dir, "901.log", "line 1\nline 2\nline 3\n");
        let source = FileEvidenceSource::new(Some(dir.path().to_path_buf()));

        assert_eq!(source.fetch_log_excerpt(901, 2).await.unwrap(), "line 2\nline 3");
        assert_eq!(source.fetch_log_excerpt(902, 2).await.unwrap(), "");

        let found = source.fetch_full_log(&JobRecord::new(901, 900, "build")).await.unwrap();
        assert_eq!(found, Some(dir.path().join("901.log")));
        assert!(source
            .fetch_full_log(&JobRecord::new(902, 900, "lint"))
            .await
            .unwrap()
            .is_none());
    }
}
