//! Root cause classifier: drives the tier state machine for one job.
//!
//! Each step produces an [`Observation`] through I/O, hands it to
//! [`advance`], then executes the returned effects in order. Tier failures
//! end in a typed [`ClassificationStatus`]; only storage errors surface as
//! `Err`.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::evidence_policy::LazyEvidencePolicy;
use super::pattern_matcher::PatternMatcher;
use super::prompt_builder::PromptBuilder;
use super::semantic_cache::SemanticCache;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    advance, tail_lines, CacheHint, CacheOutcome, CacheProbe, ClassificationResult, Config,
    DiscoveryMethod, Effect, EmbeddingMetadata, FailureContext, JobEvidence, JobRecord,
    LogAvailability, MoreInfoRequest, Observation, OracleReply, OutcomeCause, PipelineState,
    RootCause, TierPolicy,
};
use crate::domain::ports::{EvidenceSource, JobRepository, KnowledgeStore, LlmOracle, OracleError};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub policy: TierPolicy,
    /// Log lines used to build the failure context.
    pub initial_log_lines: usize,
    /// Log lines sent to the LLM once the full log is available.
    pub full_log_lines: usize,
    pub llm_timeout: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            policy: TierPolicy::default(),
            initial_log_lines: 50,
            full_log_lines: 400,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl ClassifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.tier_policy(),
            initial_log_lines: config.evidence.initial_log_lines,
            full_log_lines: config.evidence.full_log_lines,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }
}

/// Per-call overrides used by follow-up attempts.
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Log lines to send to the LLM instead of the configured amount.
    pub log_lines: Option<usize>,
    /// The oracle's previous request for more evidence.
    pub follow_up: Option<MoreInfoRequest>,
    /// A previous attempt already asked the evidence source for the full
    /// log. Only a stored log path is consulted.
    pub full_log_sought: bool,
}

/// State threaded through one classification.
#[derive(Debug, Default)]
struct Scratch {
    excerpt: String,
    llm_excerpt: Option<String>,
    cache_entry_id: Option<Uuid>,
    recorded: Option<Uuid>,
    full_log_requested: bool,
    llm_invoked: bool,
    llm_tokens: u64,
}

pub struct RootCauseClassifier {
    matcher: PatternMatcher,
    knowledge: Arc<dyn KnowledgeStore>,
    jobs: Arc<dyn JobRepository>,
    cache: Option<SemanticCache>,
    oracle: Option<Arc<dyn LlmOracle>>,
    prompts: PromptBuilder,
    evidence_policy: LazyEvidencePolicy,
    settings: ClassifierSettings,
}

impl RootCauseClassifier {
    pub fn new(
        matcher: PatternMatcher,
        knowledge: Arc<dyn KnowledgeStore>,
        jobs: Arc<dyn JobRepository>,
        settings: ClassifierSettings,
    ) -> Self {
        let evidence_policy = LazyEvidencePolicy::new(
            settings.policy.llm_enabled,
            settings.policy.llm_confidence_threshold,
        );
        Self {
            matcher,
            knowledge,
            jobs,
            cache: None,
            oracle: None,
            prompts: PromptBuilder::new(),
            evidence_policy,
            settings,
        }
    }

    /// Enable Tier 2.
    pub fn with_semantic_cache(mut self, cache: SemanticCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable Tier 3 calls. Without an oracle every escalation ends in
    /// `llm_failure`.
    pub fn with_oracle(mut self, oracle: Arc<dyn LlmOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn evidence_policy(&self) -> &LazyEvidencePolicy {
        &self.evidence_policy
    }

    /// Classify one failed job. The job must already be stored.
    pub async fn classify(
        &self,
        evidence: &JobEvidence,
        source: &dyn EvidenceSource,
        options: &ClassifyOptions,
    ) -> DomainResult<ClassificationResult> {
        let started = Instant::now();
        let job_id = evidence.job.id;
        let mut scratch = Scratch::default();
        let mut state = PipelineState::Start;

        let conclusion = loop {
            let observation = match &state {
                PipelineState::Done(conclusion) => break conclusion.clone(),
                PipelineState::Start => Observation::Pattern(
                    self.matcher
                        .match_failure(&evidence.annotations, &evidence.failed_steps),
                ),
                PipelineState::PatternChecked(_) => {
                    Observation::Cache(self.probe_cache(evidence, source, &mut scratch).await?)
                }
                PipelineState::CacheChecked(escalation) => Observation::Evidence {
                    needs_full_logs: self.evidence_policy.needs_full_logs(escalation),
                },
                PipelineState::LogFetchNeeded(_) => {
                    Observation::FullLog(self.acquire_full_log(&evidence.job, source, options, &mut scratch).await)
                }
                PipelineState::LlmInvoked(escalation) => {
                    self.consult_oracle(evidence, source, options, escalation.hint.as_ref(), &mut scratch)
                        .await
                }
            };

            debug!(job_id, state = state.name(), "advancing pipeline");
            let transition = advance(state, observation, &self.settings.policy)?;
            self.apply(job_id, transition.effects, &mut scratch).await?;
            state = transition.next;
        };

        let mut result = ClassificationResult::new(job_id, conclusion.status);
        result.method = conclusion.method;
        result.confidence = conclusion.confidence;
        result.root_cause_id = scratch.recorded;
        result.cache_entry_id = scratch.cache_entry_id;
        if let Some(request) = conclusion.more_info {
            result.requested_lines = request.lines;
            result.more_info_request = Some(request.request);
        }
        result.full_log_requested = scratch.full_log_requested;
        result.llm_invoked = scratch.llm_invoked;
        result.llm_tokens = scratch.llm_tokens;
        result.duration_ms = elapsed_ms(started);

        info!(
            job_id,
            status = %result.status,
            method = result.method.map(|m| m.as_str()),
            confidence = result.confidence,
            root_cause_id = ?result.root_cause_id,
            tokens = result.llm_tokens,
            full_log = result.full_log_requested,
            "classification finished"
        );
        Ok(result)
    }

    async fn probe_cache(
        &self,
        evidence: &JobEvidence,
        source: &dyn EvidenceSource,
        scratch: &mut Scratch,
    ) -> DomainResult<CacheProbe> {
        scratch.excerpt = match source
            .fetch_log_excerpt(evidence.job.id, self.settings.initial_log_lines)
            .await
        {
            Ok(excerpt) => excerpt,
            Err(e) => {
                warn!(job_id = evidence.job.id, error = %e, "log excerpt unavailable");
                String::new()
            }
        };

        let Some(cache) = &self.cache else {
            return Ok(CacheProbe::Disabled);
        };

        let context = FailureContext::build(evidence, &scratch.excerpt);
        let probe = cache.probe(&context, evidence).await?;
        scratch.cache_entry_id = match &probe {
            CacheProbe::ExactResolved { entry_id, .. }
            | CacheProbe::ExactDangling { entry_id }
            | CacheProbe::Searched { entry_id, .. } => Some(*entry_id),
            CacheProbe::Disabled | CacheProbe::Unavailable { .. } => None,
        };
        Ok(probe)
    }

    async fn acquire_full_log(
        &self,
        job: &JobRecord,
        source: &dyn EvidenceSource,
        options: &ClassifyOptions,
        scratch: &mut Scratch,
    ) -> LogAvailability {
        scratch.full_log_requested = true;
        let lines = options.log_lines.unwrap_or(self.settings.full_log_lines);

        if let Some(path) = job.log_file_path.as_deref() {
            if let Some(tail) = read_tail(Path::new(path), lines).await {
                scratch.llm_excerpt = Some(tail);
                return LogAvailability::AlreadyLocal;
            }
        }

        if options.full_log_sought {
            debug!(job_id = job.id, "full log already sought, not fetching again");
            return LogAvailability::Unavailable;
        }

        match source.fetch_full_log(job).await {
            Ok(Some(path)) => {
                scratch.llm_excerpt = read_tail(&path, lines).await;
                LogAvailability::Fetched {
                    path: path.display().to_string(),
                }
            }
            Ok(None) => {
                info!(job_id = job.id, "full log unavailable");
                LogAvailability::Unavailable
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "full log fetch failed");
                LogAvailability::Unavailable
            }
        }
    }

    async fn consult_oracle(
        &self,
        evidence: &JobEvidence,
        source: &dyn EvidenceSource,
        options: &ClassifyOptions,
        hint: Option<&CacheHint>,
        scratch: &mut Scratch,
    ) -> Observation {
        let Some(oracle) = &self.oracle else {
            return Observation::OracleFailed {
                reason: OracleError::NotConfigured("no llm oracle".to_string()).to_string(),
            };
        };

        let excerpt = match scratch.llm_excerpt.take() {
            Some(excerpt) => excerpt,
            None => match options.log_lines {
                Some(lines) if lines > self.settings.initial_log_lines => source
                    .fetch_log_excerpt(evidence.job.id, lines)
                    .await
                    .unwrap_or_else(|_| scratch.excerpt.clone()),
                _ => scratch.excerpt.clone(),
            },
        };

        let messages = self
            .prompts
            .build(evidence, &excerpt, hint, options.follow_up.as_ref());
        scratch.llm_invoked = true;
        let started = Instant::now();

        match tokio::time::timeout(self.settings.llm_timeout, oracle.send(&messages)).await {
            Err(_) => {
                let err = OracleError::Timeout(self.settings.llm_timeout.as_secs());
                warn!(job_id = evidence.job.id, error = %err, "llm call timed out");
                Observation::OracleFailed {
                    reason: err.to_string(),
                }
            }
            Ok(Err(e)) => {
                warn!(job_id = evidence.job.id, provider = oracle.name(), error = %e, "llm call failed");
                Observation::OracleFailed {
                    reason: e.to_string(),
                }
            }
            Ok(Ok(response)) => {
                scratch.llm_tokens += response.usage.total;
                Observation::OracleReplied(OracleReply {
                    content: response.content,
                    model: response.model,
                    tokens: response.usage.total,
                    duration_ms: elapsed_ms(started),
                })
            }
        }
    }

    async fn apply(&self, job_id: i64, effects: Vec<Effect>, scratch: &mut Scratch) -> DomainResult<()> {
        for effect in effects {
            match effect {
                Effect::RecordRootCause {
                    candidate,
                    detection,
                } => {
                    candidate.validate().map_err(DomainError::ValidationFailed)?;
                    let found = self.knowledge.find_or_create_root_cause(&candidate).await?;
                    let id = found.root_cause.id;
                    self.knowledge.link_job(job_id, Some(id), &detection).await?;
                    if !found.created {
                        self.knowledge.bump_occurrence(Some(id)).await?;
                    }
                    self.knowledge.touch_last_seen(Some(id)).await?;
                    scratch.recorded = Some(id);

                    if found.created && candidate.discovery_method == DiscoveryMethod::Llm {
                        self.embed_root_cause(&found.root_cause).await;
                    }
                }
                Effect::RecordExisting {
                    root_cause_id,
                    detection,
                } => {
                    self.knowledge
                        .link_job(job_id, Some(root_cause_id), &detection)
                        .await?;
                    self.knowledge.bump_occurrence(Some(root_cause_id)).await?;
                    self.knowledge.touch_last_seen(Some(root_cause_id)).await?;
                    scratch.recorded = Some(root_cause_id);
                }
                Effect::RecordAttempt { detection } => {
                    self.knowledge.link_job(job_id, None, &detection).await?;
                }
                Effect::MarkReused { entry_id } => {
                    self.cache()?.entries().mark_reused(entry_id).await?;
                }
                Effect::AttachOutcome { entry_id, outcome } => {
                    let root_cause_id = match outcome.cause {
                        OutcomeCause::Known(id) => Some(id),
                        OutcomeCause::Recorded => scratch.recorded,
                    };
                    self.cache()?
                        .entries()
                        .attach_outcome(
                            entry_id,
                            &CacheOutcome {
                                model: outcome.model,
                                response: outcome.response,
                                tokens: outcome.tokens,
                                duration_ms: outcome.duration_ms,
                                root_cause_id,
                                confidence: outcome.confidence,
                            },
                        )
                        .await?;
                }
                Effect::SetLogState { accessible, path } => {
                    self.jobs
                        .set_log_state(job_id, accessible, path.as_deref())
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn cache(&self) -> DomainResult<&SemanticCache> {
        self.cache
            .as_ref()
            .ok_or_else(|| DomainError::ExecutionFailed("semantic cache is disabled".to_string()))
    }

    /// Best effort: a missing embedding only weakens later similarity search.
    async fn embed_root_cause(&self, root_cause: &RootCause) {
        let Some(cache) = &self.cache else {
            return;
        };
        let embedder = cache.embedder();

        let result = match embedder.embed(&root_cause.embedding_text()).await {
            Ok(embedding) => {
                let metadata = EmbeddingMetadata {
                    provider: embedder.name().to_string(),
                    model: embedding.model.clone(),
                    dimensions: embedding.dimensions,
                    generated_at: Utc::now(),
                };
                self.knowledge
                    .set_root_cause_embedding(root_cause.id, &embedding.vector, &metadata)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(root_cause_id = %root_cause.id, error = %e, "root cause embedding skipped");
        }
    }
}

async fn read_tail(path: &Path, lines: usize) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(log) => Some(tail_lines(&log, lines)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "log file unreadable");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::embeddings::HashingEmbeddingProvider;
    use crate::adapters::evidence::FileEvidenceSource;
    use crate::adapters::oracles::ScriptedOracle;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteJobRepository, SqliteKnowledgeStore, SqlitePromptCacheRepository,
    };
    use crate::domain::models::{Annotation, ClassificationStatus, DetectionMethod, WorkflowRun};
    use crate::domain::ports::PromptCacheRepository;
    use crate::services::semantic_cache::SemanticCacheSettings;

    struct Harness {
        knowledge: Arc<SqliteKnowledgeStore>,
        jobs: Arc<SqliteJobRepository>,
        entries: Arc<SqlitePromptCacheRepository>,
    }

    impl Harness {
        async fn new() -> Self {
            let pool = create_migrated_test_pool().await.unwrap();
            Self {
                knowledge: Arc::new(SqliteKnowledgeStore::new(pool.clone())),
                jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
                entries: Arc::new(SqlitePromptCacheRepository::new(pool)),
            }
        }

        fn classifier(&self, llm_enabled: bool, oracle: Option<Arc<ScriptedOracle>>) -> RootCauseClassifier {
            let settings = ClassifierSettings {
                policy: TierPolicy {
                    llm_enabled,
                    ..TierPolicy::default()
                },
                ..ClassifierSettings::default()
            };
            let cache = SemanticCache::new(
                self.entries.clone(),
                self.knowledge.clone(),
                Arc::new(HashingEmbeddingProvider::new(128).unwrap()),
                SemanticCacheSettings::default(),
            );
            let classifier = RootCauseClassifier::new(
                PatternMatcher::builtin().unwrap(),
                self.knowledge.clone(),
                self.jobs.clone(),
                settings,
            )
            .with_semantic_cache(cache);
            match oracle {
                Some(o) => classifier.with_oracle(o),
                None => classifier,
            }
        }

        async fn evidence(&self, job_id: i64, message: &str) -> JobEvidence {
            let run = WorkflowRun {
                id: 1,
                repository: "acme/widgets".to_string(),
                workflow_name: "CI".to_string(),
                head_branch: None,
                head_sha: None,
                processed_at: None,
            };
            let job = JobRecord::new(job_id, 1, "build");
            self.jobs.upsert_run(&run).await.unwrap();
            self.jobs.upsert_job(&job).await.unwrap();
            JobEvidence {
                run,
                job,
                annotations: vec![Annotation::message(message)],
                failed_steps: vec![],
            }
        }
    }

    fn verdict(confidence: f64) -> String {
        format!(
            r#"{{"type":"root_cause","category":"compilation_error","title":"Missing linker","description":"cc not installed","confidence":{confidence}}}"#
        )
    }

    #[tokio::test]
    async fn test_specific_pattern_short_circuits() {
        let h = Harness::new().await;
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let classifier = h.classifier(true, Some(oracle.clone()));
        let ev = h.evidence(1, "npm ERR! code ERESOLVE").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ClassificationStatus::PatternMatched);
        assert_eq!(result.method, Some(DetectionMethod::Pattern));
        assert!(!result.full_log_requested);
        assert!(!result.llm_invoked);
        assert_eq!(oracle.calls(), 0);
        assert!(h.entries.stats().await.unwrap().entries == 0);
    }

    #[tokio::test]
    async fn test_generic_failure_without_llm_is_no_match() {
        let h = Harness::new().await;
        let classifier = h.classifier(false, None);
        let ev = h.evidence(2, "Process completed with exit code 1").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ClassificationStatus::NoMatch);
        assert!(result.root_cause_id.is_none());
        assert!(!result.full_log_requested);
        assert!(h.knowledge.links_for_job(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_resolution_updates_cache_entry() {
        let h = Harness::new().await;
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(verdict(0.9))]));
        let classifier = h.classifier(true, Some(oracle.clone()));
        let ev = h.evidence(3, "Process completed with exit code 1").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ClassificationStatus::LlmResolved);
        assert!(result.full_log_requested);
        assert_eq!(result.llm_tokens, 100);
        let rc_id = result.root_cause_id.unwrap();
        let entry = h.entries.get(result.cache_entry_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(entry.root_cause_id, Some(rc_id));
        assert_eq!(entry.llm_model.as_deref(), Some("scripted-model"));

        let stored = h.knowledge.get_root_cause_by_id(rc_id).await.unwrap().unwrap();
        assert_eq!(stored.discovery_method, DiscoveryMethod::Llm);
        assert!(stored.embedding_metadata.is_some());

        let job = h.jobs.get_job(3).await.unwrap().unwrap();
        assert!(!job.logs_accessible, "no log source means the job is flagged");
    }

    #[tokio::test]
    async fn test_oracle_timeout_is_llm_failure() {
        let h = Harness::new().await;
        let oracle = Arc::new(
            ScriptedOracle::new(vec![Ok(verdict(0.9))]).with_delay(Duration::from_millis(200)),
        );
        let mut classifier = h.classifier(true, Some(oracle));
        classifier.settings.llm_timeout = Duration::from_millis(20);
        let ev = h.evidence(4, "Process completed with exit code 1").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ClassificationStatus::LlmFailure);
        assert!(result.llm_invoked);
        assert!(h.knowledge.links_for_job(4).await.unwrap().is_empty());
        let entry = h.entries.get(result.cache_entry_id.unwrap()).await.unwrap().unwrap();
        assert!(entry.root_cause_id.is_none(), "pre-LLM cache entry survives");
    }

    #[tokio::test]
    async fn test_missing_oracle_is_llm_failure() {
        let h = Harness::new().await;
        let classifier = h.classifier(true, None);
        let ev = h.evidence(5, "something odd happened").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, ClassificationStatus::LlmFailure);
        assert!(!result.llm_invoked);
    }

    #[tokio::test]
    async fn test_need_more_info_exposes_request() {
        let h = Harness::new().await;
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"type":"need_more_info","request":"show the linker output","lines":300}"#.to_string(),
        )]));
        let classifier = h.classifier(true, Some(oracle));
        let ev = h.evidence(6, "Process completed with exit code 1").await;

        let result = classifier
            .classify(&ev, &FileEvidenceSource::default(), &ClassifyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, ClassificationStatus::LlmNeedMoreInfo);
        assert_eq!(result.more_info_request.as_deref(), Some("show the linker output"));
        assert_eq!(result.requested_lines, Some(300));
        let links = h.knowledge.links_for_job(6).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].detection.method, DetectionMethod::LlmNeedMoreInfo);
        assert!(links[0].root_cause_id.is_none());
    }
}
