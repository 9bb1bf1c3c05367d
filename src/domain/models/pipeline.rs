//! Tiered classification state machine.
//!
//! `advance` is a pure function from `(state, observation)` to the next state
//! plus the list of persistence effects that transition implies. The
//! classifier service is responsible for producing observations (running the
//! pattern matcher, probing the cache, fetching logs, calling the oracle) and
//! for executing effects against the stores. Keeping the decisions here means
//! every tier rule can be tested without any I/O.
//!
//! ```text
//! Start ─pattern─▶ PatternChecked ─cache─▶ CacheChecked ─evidence─▶ LogFetchNeeded ─log─▶ LlmInvoked ─oracle─▶ Done
//!   │                    │                       └──────────(logs not needed)─────────────────▲
//!   └──────▶ Done        └──────▶ Done
//! ```

use serde_json::json;
use uuid::Uuid;

use super::classification::ClassificationStatus;
use super::detection::{Detection, DetectionMethod};
use super::pattern::PatternMatch;
use super::prompt_cache::SEMANTIC_REUSE_MODEL;
use super::root_cause::{DiscoveryMethod, RootCauseCandidate};
use super::verdict::{parse_verdict, LlmVerdict, MoreInfoRequest};
use crate::domain::errors::{DomainError, DomainResult};

/// Tuning knobs the state machine consults.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    /// Whether escalation past Tier 1 is allowed at all.
    pub llm_enabled: bool,
    /// Minimum LLM confidence for a verdict to be accepted.
    pub llm_confidence_threshold: f64,
    /// Similarity at or above which a semantic hit is trusted outright.
    pub accept_similarity: f64,
    /// Prior reuse count at or above which a semantic hit is trusted.
    pub accept_reuse_count: u64,
    /// Record the generic Tier 1 match when the oracle is unreachable.
    pub fallback_to_pattern: bool,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            llm_enabled: false,
            llm_confidence_threshold: 0.8,
            accept_similarity: 0.90,
            accept_reuse_count: 3,
            fallback_to_pattern: false,
        }
    }
}

/// A Tier 2 similarity hit as seen by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarCandidate {
    pub entry_id: Uuid,
    pub root_cause_id: Uuid,
    pub category: String,
    pub title: String,
    pub similarity: f64,
    pub reuse_count: u64,
    pub confidence: Option<f64>,
    pub discovery_method: DiscoveryMethod,
}

impl SimilarCandidate {
    /// Acceptance rule for reusing a past analysis without calling the LLM.
    pub fn is_trusted(&self, policy: &TierPolicy) -> bool {
        self.similarity >= policy.accept_similarity
            || self.reuse_count >= policy.accept_reuse_count
            || self.discovery_method == DiscoveryMethod::Pattern
    }

    fn reuse_confidence(&self) -> f64 {
        self.confidence.unwrap_or(self.similarity).clamp(0.0, 1.0)
    }
}

/// A similarity hit that was not trusted, forwarded to the prompt as context.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHint {
    pub entry_id: Uuid,
    pub category: String,
    pub title: String,
    pub similarity: f64,
    pub confidence: Option<f64>,
    pub reuse_count: u64,
}

impl From<SimilarCandidate> for CacheHint {
    fn from(c: SimilarCandidate) -> Self {
        Self {
            entry_id: c.entry_id,
            category: c.category,
            title: c.title,
            similarity: c.similarity,
            confidence: c.confidence,
            reuse_count: c.reuse_count,
        }
    }
}

/// What escalation has learned so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Escalation {
    /// Tier 1 match, if any. Only ever generic here.
    pub pattern: Option<PatternMatch>,
    /// Cache entry whose outcome Tier 3 must update.
    pub cache_entry_id: Option<Uuid>,
    pub hint: Option<CacheHint>,
}

impl Escalation {
    /// Best confidence any cheaper tier produced.
    pub fn best_confidence(&self) -> Option<f64> {
        let pattern = self.pattern.as_ref().map(|p| p.confidence);
        let hint = self.hint.as_ref().and_then(|h| h.confidence);
        match (pattern, hint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Terminal summary carried by [`PipelineState::Done`].
#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    pub status: ClassificationStatus,
    pub method: Option<DetectionMethod>,
    pub confidence: Option<f64>,
    pub more_info: Option<MoreInfoRequest>,
}

impl Conclusion {
    fn new(status: ClassificationStatus, method: Option<DetectionMethod>, confidence: Option<f64>) -> Self {
        Self {
            status,
            method,
            confidence,
            more_info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Start,
    PatternChecked(Escalation),
    CacheChecked(Escalation),
    LogFetchNeeded(Escalation),
    LlmInvoked(Escalation),
    Done(Conclusion),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::PatternChecked(_) => "pattern_checked",
            Self::CacheChecked(_) => "cache_checked",
            Self::LogFetchNeeded(_) => "log_fetch_needed",
            Self::LlmInvoked(_) => "llm_invoked",
            Self::Done(_) => "done",
        }
    }
}

/// Result of probing the semantic cache for a failure context.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheProbe {
    /// Semantic search is switched off.
    Disabled,
    /// Exact hash hit whose root cause still exists.
    ExactResolved {
        entry_id: Uuid,
        root_cause_id: Uuid,
        confidence: f64,
    },
    /// Exact hash hit whose root cause was deleted from the catalog.
    ExactDangling { entry_id: Uuid },
    /// Similarity search ran; `entry_id` is the entry for this context.
    Searched {
        entry_id: Uuid,
        top: Option<SimilarCandidate>,
    },
    /// Embedding provider failed.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogAvailability {
    /// Downloaded to a local path.
    Fetched { path: String },
    /// The job already had a local log.
    AlreadyLocal,
    /// The evidence source could not provide the log.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    pub content: String,
    pub model: String,
    pub tokens: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Pattern(Option<PatternMatch>),
    Cache(CacheProbe),
    Evidence { needs_full_logs: bool },
    FullLog(LogAvailability),
    OracleFailed { reason: String },
    OracleReplied(OracleReply),
}

impl Observation {
    fn name(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "pattern",
            Self::Cache(_) => "cache",
            Self::Evidence { .. } => "evidence",
            Self::FullLog(_) => "full_log",
            Self::OracleFailed { .. } => "oracle_failed",
            Self::OracleReplied(_) => "oracle_replied",
        }
    }
}

/// Root cause an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCause {
    Known(Uuid),
    /// The cause resolved by the `RecordRootCause` effect earlier in the same
    /// transition.
    Recorded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingOutcome {
    pub model: String,
    pub response: String,
    pub tokens: u64,
    pub duration_ms: u64,
    pub cause: OutcomeCause,
    pub confidence: f64,
}

/// Persistence side effects, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Find-or-create the cause, link the job, bump occurrence, touch last-seen.
    RecordRootCause {
        candidate: RootCauseCandidate,
        detection: Detection,
    },
    /// Link the job to an existing cause, bump occurrence, touch last-seen.
    RecordExisting {
        root_cause_id: Uuid,
        detection: Detection,
    },
    /// Append a null-cause audit link.
    RecordAttempt { detection: Detection },
    MarkReused { entry_id: Uuid },
    AttachOutcome {
        entry_id: Uuid,
        outcome: PendingOutcome,
    },
    SetLogState {
        accessible: bool,
        path: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: PipelineState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: PipelineState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn done(conclusion: Conclusion, effects: Vec<Effect>) -> Self {
        Self {
            next: PipelineState::Done(conclusion),
            effects,
        }
    }
}

/// Advance the pipeline by one observation.
pub fn advance(
    state: PipelineState,
    observation: Observation,
    policy: &TierPolicy,
) -> DomainResult<Transition> {
    match (state, observation) {
        (PipelineState::Start, Observation::Pattern(found)) => Ok(after_pattern(found, policy)),
        (PipelineState::PatternChecked(esc), Observation::Cache(probe)) => {
            Ok(after_cache(esc, probe, policy))
        }
        (PipelineState::CacheChecked(esc), Observation::Evidence { needs_full_logs }) => {
            Ok(Transition::to(if needs_full_logs {
                PipelineState::LogFetchNeeded(esc)
            } else {
                PipelineState::LlmInvoked(esc)
            }))
        }
        (PipelineState::LogFetchNeeded(esc), Observation::FullLog(availability)) => {
            let effects = match availability {
                LogAvailability::Fetched { path } => vec![Effect::SetLogState {
                    accessible: true,
                    path: Some(path),
                }],
                LogAvailability::AlreadyLocal => Vec::new(),
                LogAvailability::Unavailable => vec![Effect::SetLogState {
                    accessible: false,
                    path: None,
                }],
            };
            Ok(Transition {
                next: PipelineState::LlmInvoked(esc),
                effects,
            })
        }
        (PipelineState::LlmInvoked(esc), Observation::OracleFailed { .. }) => {
            Ok(escalation_failed(esc, policy))
        }
        (PipelineState::LlmInvoked(esc), Observation::OracleReplied(reply)) => {
            Ok(after_oracle(esc, reply, policy))
        }
        (state, observation) => Err(DomainError::InvalidStateTransition {
            from: state.name().to_string(),
            observation: observation.name().to_string(),
        }),
    }
}

fn after_pattern(found: Option<PatternMatch>, policy: &TierPolicy) -> Transition {
    match found {
        Some(m) if !m.is_generic() => {
            let detection = Detection::new(DetectionMethod::Pattern, m.confidence)
                .with_raw(json!({ "rule_id": m.rule_id }).to_string());
            Transition::done(
                Conclusion::new(
                    ClassificationStatus::PatternMatched,
                    Some(DetectionMethod::Pattern),
                    Some(m.confidence),
                ),
                vec![Effect::RecordRootCause {
                    candidate: m.to_candidate(),
                    detection,
                }],
            )
        }
        found if policy.llm_enabled => Transition::to(PipelineState::PatternChecked(Escalation {
            pattern: found,
            ..Escalation::default()
        })),
        found => Transition::done(
            Conclusion::new(
                ClassificationStatus::NoMatch,
                Some(DetectionMethod::Pattern),
                found.map(|m| m.confidence),
            ),
            Vec::new(),
        ),
    }
}

fn after_cache(mut esc: Escalation, probe: CacheProbe, policy: &TierPolicy) -> Transition {
    match probe {
        CacheProbe::Disabled => Transition::to(PipelineState::CacheChecked(esc)),
        CacheProbe::ExactResolved {
            entry_id,
            root_cause_id,
            confidence,
        } => {
            let detection = Detection::new(DetectionMethod::PromptCacheExact, confidence)
                .with_raw(json!({ "cache_entry_id": entry_id }).to_string());
            Transition::done(
                Conclusion::new(
                    ClassificationStatus::CacheExact,
                    Some(DetectionMethod::PromptCacheExact),
                    Some(confidence),
                ),
                vec![
                    Effect::RecordExisting {
                        root_cause_id,
                        detection,
                    },
                    Effect::MarkReused { entry_id },
                ],
            )
        }
        CacheProbe::ExactDangling { entry_id } => {
            esc.cache_entry_id = Some(entry_id);
            Transition::to(PipelineState::CacheChecked(esc))
        }
        CacheProbe::Searched { entry_id, top } => {
            esc.cache_entry_id = Some(entry_id);
            match top {
                Some(candidate) if candidate.is_trusted(policy) => {
                    let confidence = candidate.reuse_confidence();
                    let payload = json!({
                        "reused_entry_id": candidate.entry_id,
                        "similarity": candidate.similarity,
                        "prior_reuse_count": candidate.reuse_count,
                    })
                    .to_string();
                    let detection = Detection::new(DetectionMethod::PromptSemanticSearch, confidence)
                        .with_raw(payload.clone());
                    Transition::done(
                        Conclusion::new(
                            ClassificationStatus::CacheSemantic,
                            Some(DetectionMethod::PromptSemanticSearch),
                            Some(confidence),
                        ),
                        vec![
                            Effect::MarkReused {
                                entry_id: candidate.entry_id,
                            },
                            Effect::RecordExisting {
                                root_cause_id: candidate.root_cause_id,
                                detection,
                            },
                            Effect::AttachOutcome {
                                entry_id,
                                outcome: PendingOutcome {
                                    model: SEMANTIC_REUSE_MODEL.to_string(),
                                    response: payload,
                                    tokens: 0,
                                    duration_ms: 0,
                                    cause: OutcomeCause::Known(candidate.root_cause_id),
                                    confidence,
                                },
                            },
                        ],
                    )
                }
                top => {
                    esc.hint = top.map(CacheHint::from);
                    Transition::to(PipelineState::CacheChecked(esc))
                }
            }
        }
        CacheProbe::Unavailable { .. } => escalation_failed(esc, policy),
    }
}

fn escalation_failed(esc: Escalation, policy: &TierPolicy) -> Transition {
    match esc.pattern {
        Some(pattern) if policy.fallback_to_pattern => {
            let detection = Detection::new(DetectionMethod::Pattern, pattern.confidence)
                .with_raw(json!({ "rule_id": pattern.rule_id, "fallback": true }).to_string());
            Transition::done(
                Conclusion::new(
                    ClassificationStatus::PatternFallback,
                    Some(DetectionMethod::Pattern),
                    Some(pattern.confidence),
                ),
                vec![Effect::RecordRootCause {
                    candidate: pattern.to_candidate(),
                    detection,
                }],
            )
        }
        _ => Transition::done(
            Conclusion::new(ClassificationStatus::LlmFailure, None, None),
            Vec::new(),
        ),
    }
}

fn after_oracle(esc: Escalation, reply: OracleReply, policy: &TierPolicy) -> Transition {
    let audit = |method: DetectionMethod, confidence: f64| {
        Detection::new(method, confidence)
            .with_llm(&reply.model, reply.tokens, reply.duration_ms)
            .with_raw(reply.content.clone())
    };

    match parse_verdict(&reply.content) {
        Err(_) => Transition::done(
            Conclusion::new(
                ClassificationStatus::LlmMalformed,
                Some(DetectionMethod::LlmMalformed),
                None,
            ),
            vec![Effect::RecordAttempt {
                detection: audit(DetectionMethod::LlmMalformed, 0.0),
            }],
        ),
        Ok(LlmVerdict::NeedMoreInfo(request)) => {
            let mut conclusion = Conclusion::new(
                ClassificationStatus::LlmNeedMoreInfo,
                Some(DetectionMethod::LlmNeedMoreInfo),
                None,
            );
            conclusion.more_info = Some(request);
            Transition::done(
                conclusion,
                vec![Effect::RecordAttempt {
                    detection: audit(DetectionMethod::LlmNeedMoreInfo, 0.0),
                }],
            )
        }
        Ok(LlmVerdict::RootCause(verdict)) if verdict.confidence < policy.llm_confidence_threshold => {
            Transition::done(
                Conclusion::new(
                    ClassificationStatus::LlmBelowThreshold,
                    Some(DetectionMethod::LlmBelowThreshold),
                    Some(verdict.confidence),
                ),
                vec![Effect::RecordAttempt {
                    detection: audit(DetectionMethod::LlmBelowThreshold, verdict.confidence),
                }],
            )
        }
        Ok(LlmVerdict::RootCause(verdict)) => {
            let candidate = RootCauseCandidate::new(
                &verdict.category,
                &verdict.title,
                verdict.description.clone(),
                verdict.suggested_fix.clone(),
                verdict.confidence,
                DiscoveryMethod::Llm,
            );
            let mut effects = vec![Effect::RecordRootCause {
                candidate,
                detection: audit(DetectionMethod::Llm, verdict.confidence),
            }];
            if let Some(entry_id) = esc.cache_entry_id {
                effects.push(Effect::AttachOutcome {
                    entry_id,
                    outcome: PendingOutcome {
                        model: reply.model.clone(),
                        response: reply.content.clone(),
                        tokens: reply.tokens,
                        duration_ms: reply.duration_ms,
                        cause: OutcomeCause::Recorded,
                        confidence: verdict.confidence,
                    },
                });
            }
            Transition::done(
                Conclusion::new(
                    ClassificationStatus::LlmResolved,
                    Some(DetectionMethod::Llm),
                    Some(verdict.confidence),
                ),
                effects,
            )
        }
    }
}
