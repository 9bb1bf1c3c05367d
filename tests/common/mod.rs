//! Common test utilities for integration tests
//!
//! Provides a migrated in-memory database, a keyword-driven embedder whose
//! similarities are chosen by the test, and an in-memory evidence source that
//! counts what the pipeline asks it for.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use citriage::adapters::oracles::ScriptedOracle;
use citriage::adapters::sqlite::{
    create_migrated_test_pool, SqliteJobRepository, SqliteKnowledgeStore, SqlitePromptCacheRepository,
};
use citriage::domain::errors::{DomainError, DomainResult};
use citriage::domain::models::{
    tail_lines, Annotation, Detection, EmbeddingMetadata, FailedStep, FoundRootCause, JobEvidence,
    JobRecord, JobRootCauseLink, RootCause, RootCauseCandidate, TierPolicy, WorkflowRun,
};
use citriage::domain::ports::{
    Embedding, EmbeddingProvider, EvidenceSource, JobRepository, KnowledgeStore,
};
use uuid::Uuid;
use citriage::services::{
    ClassifierSettings, FollowUpPolicy, PatternMatcher, RootCauseClassifier, RunProcessor,
    SemanticCache, SemanticCacheSettings,
};

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Embeds a text as the vector of the first keyword it contains.
///
/// Lets a test pick exact cosine similarities between failure contexts.
pub struct KeywordEmbedder {
    keywords: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[(&str, [f32; 3])]) -> Self {
        Self {
            keywords: keywords.iter().map(|(k, v)| ((*k).to_string(), v.to_vec())).collect(),
            fallback: vec![0.0, 0.0, 1.0],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn model(&self) -> &str {
        "keyword-test"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> DomainResult<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let vector = self
            .keywords
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map_or_else(|| self.fallback.clone(), |(_, v)| v.clone());
        Ok(Embedding {
            dimensions: vector.len(),
            vector,
            model: self.model().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
struct JobFixture {
    annotations: Vec<Annotation>,
    steps: Vec<FailedStep>,
}

/// Evidence held in memory; logs are written to a private temp dir so the
/// classifier can read them by path.
pub struct MemorySource {
    jobs: Mutex<HashMap<i64, JobFixture>>,
    logs: TempDir,
    pub annotation_fetches: AtomicUsize,
    pub full_log_fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            logs: TempDir::new().expect("Failed to create temp dir"),
            annotation_fetches: AtomicUsize::new(0),
            full_log_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_job(self, job_id: i64, messages: &[&str], steps: &[&str]) -> Self {
        self.jobs.lock().unwrap().insert(
            job_id,
            JobFixture {
                annotations: messages.iter().map(|m| Annotation::message(*m)).collect(),
                steps: steps.iter().map(|s| FailedStep::new(*s)).collect(),
            },
        );
        self
    }

    pub fn with_log(self, job_id: i64, log: &str) -> Self {
        self.add_log(job_id, log);
        self
    }

    /// Make a log available after the fact, as a later download would.
    pub fn add_log(&self, job_id: i64, log: &str) {
        std::fs::write(self.log_path(job_id), log).expect("Failed to write log");
    }

    pub fn annotation_fetches(&self) -> usize {
        self.annotation_fetches.load(Ordering::SeqCst)
    }

    pub fn full_log_fetches(&self) -> usize {
        self.full_log_fetches.load(Ordering::SeqCst)
    }

    fn log_path(&self, job_id: i64) -> PathBuf {
        self.logs.path().join(format!("{job_id}.log"))
    }

    fn fixture(&self, job_id: i64) -> JobFixture {
        self.jobs.lock().unwrap().get(&job_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl EvidenceSource for MemorySource {
    async fn fetch_error_annotations(&self, job_id: i64) -> DomainResult<Vec<Annotation>> {
        self.annotation_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.fixture(job_id).annotations)
    }

    async fn fetch_failed_steps(&self, job: &JobRecord) -> DomainResult<Vec<FailedStep>> {
        Ok(self.fixture(job.id).steps)
    }

    async fn fetch_log_excerpt(&self, job_id: i64, line_count: usize) -> DomainResult<String> {
        match std::fs::read_to_string(self.log_path(job_id)) {
            Ok(log) => Ok(tail_lines(&log, line_count)),
            Err(_) => Ok(String::new()),
        }
    }

    async fn fetch_full_log(&self, job: &JobRecord) -> DomainResult<Option<PathBuf>> {
        self.full_log_fetches.fetch_add(1, Ordering::SeqCst);
        let path = self.log_path(job.id);
        Ok(path.is_file().then_some(path))
    }
}

/// Knowledge store whose `link_job` fails for one job, as a lost connection
/// or constraint violation would.
pub struct BrokenLinks {
    inner: Arc<SqliteKnowledgeStore>,
    broken_job: i64,
}

impl BrokenLinks {
    pub fn new(inner: Arc<SqliteKnowledgeStore>, broken_job: i64) -> Self {
        Self { inner, broken_job }
    }
}

#[async_trait]
impl KnowledgeStore for BrokenLinks {
    async fn find_or_create_root_cause(&self, candidate: &RootCauseCandidate) -> DomainResult<FoundRootCause> {
        self.inner.find_or_create_root_cause(candidate).await
    }

    async fn link_job(
        &self,
        job_id: i64,
        root_cause_id: Option<Uuid>,
        detection: &Detection,
    ) -> DomainResult<JobRootCauseLink> {
        if job_id == self.broken_job {
            return Err(DomainError::DatabaseError("database is locked".to_string()));
        }
        self.inner.link_job(job_id, root_cause_id, detection).await
    }

    async fn bump_occurrence(&self, root_cause_id: Option<Uuid>) -> DomainResult<()> {
        self.inner.bump_occurrence(root_cause_id).await
    }

    async fn touch_last_seen(&self, root_cause_id: Option<Uuid>) -> DomainResult<()> {
        self.inner.touch_last_seen(root_cause_id).await
    }

    async fn get_root_cause_by_id(&self, id: Uuid) -> DomainResult<Option<RootCause>> {
        self.inner.get_root_cause_by_id(id).await
    }

    async fn delete_root_cause(&self, id: Uuid) -> DomainResult<()> {
        self.inner.delete_root_cause(id).await
    }

    async fn set_root_cause_embedding(
        &self,
        id: Uuid,
        embedding: &[f32],
        metadata: &EmbeddingMetadata,
    ) -> DomainResult<()> {
        self.inner.set_root_cause_embedding(id, embedding, metadata).await
    }

    async fn latest_link_for_job(&self, job_id: i64) -> DomainResult<Option<JobRootCauseLink>> {
        self.inner.latest_link_for_job(job_id).await
    }

    async fn links_for_job(&self, job_id: i64) -> DomainResult<Vec<JobRootCauseLink>> {
        self.inner.links_for_job(job_id).await
    }

    async fn list_root_causes(&self) -> DomainResult<Vec<RootCause>> {
        self.inner.list_root_causes().await
    }

    async fn detection_stats(&self) -> DomainResult<BTreeMap<String, u64>> {
        self.inner.detection_stats().await
    }
}

pub fn run(id: i64) -> WorkflowRun {
    WorkflowRun {
        id,
        repository: "acme/widgets".to_string(),
        workflow_name: "CI".to_string(),
        head_branch: Some("main".to_string()),
        head_sha: None,
        processed_at: None,
    }
}

pub fn llm_policy() -> TierPolicy {
    TierPolicy {
        llm_enabled: true,
        ..TierPolicy::default()
    }
}

/// A well-formed root cause reply.
pub fn verdict(category: &str, title: &str, confidence: f64) -> String {
    format!(
        r#"{{"type":"root_cause","category":"{category}","title":"{title}","description":"found by the oracle","suggested_fix":"fix it","confidence":{confidence}}}"#
    )
}

pub fn need_more_info(request: &str, lines: usize) -> String {
    format!(r#"{{"type":"need_more_info","request":"{request}","lines":{lines}}}"#)
}

/// Storage plus embedder shared by every classifier a test builds.
pub struct Harness {
    pub knowledge: Arc<SqliteKnowledgeStore>,
    pub jobs: Arc<SqliteJobRepository>,
    pub entries: Arc<SqlitePromptCacheRepository>,
    pub embedder: Arc<KeywordEmbedder>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_embedder(KeywordEmbedder::new(&[])).await
    }

    pub async fn with_embedder(embedder: KeywordEmbedder) -> Self {
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        Self {
            knowledge: Arc::new(SqliteKnowledgeStore::new(pool.clone())),
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            entries: Arc::new(SqlitePromptCacheRepository::new(pool)),
            embedder: Arc::new(embedder),
        }
    }

    pub fn classifier(&self, policy: TierPolicy, oracle: Option<Arc<ScriptedOracle>>) -> RootCauseClassifier {
        let cache = SemanticCache::new(
            self.entries.clone(),
            self.knowledge.clone(),
            self.embedder.clone(),
            SemanticCacheSettings::default(),
        );
        let classifier = RootCauseClassifier::new(
            PatternMatcher::builtin().expect("built-in rules compile"),
            self.knowledge.clone(),
            self.jobs.clone(),
            ClassifierSettings {
                policy,
                ..ClassifierSettings::default()
            },
        )
        .with_semantic_cache(cache);
        match oracle {
            Some(oracle) => classifier.with_oracle(oracle),
            None => classifier,
        }
    }

    pub fn processor(&self, policy: TierPolicy, oracle: Option<Arc<ScriptedOracle>>) -> RunProcessor {
        RunProcessor::new(
            Arc::new(self.classifier(policy, oracle)),
            self.jobs.clone(),
            self.knowledge.clone(),
        )
        .with_follow_up(FollowUpPolicy::default())
    }

    /// Pattern-only processor whose catalog writes go through `knowledge`.
    pub fn processor_with_knowledge(&self, knowledge: Arc<dyn KnowledgeStore>) -> RunProcessor {
        let classifier = RootCauseClassifier::new(
            PatternMatcher::builtin().expect("built-in rules compile"),
            knowledge.clone(),
            self.jobs.clone(),
            ClassifierSettings::default(),
        );
        RunProcessor::new(Arc::new(classifier), self.jobs.clone(), knowledge)
    }

    /// Store a run and job and return evidence for classifying it directly.
    pub async fn evidence(&self, run_id: i64, job_id: i64, job_name: &str, messages: &[&str]) -> JobEvidence {
        let run = run(run_id);
        let job = JobRecord::new(job_id, run_id, job_name);
        self.jobs.upsert_run(&run).await.unwrap();
        self.jobs.upsert_job(&job).await.unwrap();
        JobEvidence {
            run,
            job,
            annotations: messages.iter().map(|m| Annotation::message(*m)).collect(),
            failed_steps: vec![],
        }
    }
}
