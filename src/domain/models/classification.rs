//! Terminal outcomes of a job classification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::detection::DetectionMethod;

/// Terminal status of one classification attempt.
///
/// Every variant is distinguishable in logs so efficiency metrics can be
/// derived per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    /// Tier 1 matched an informative signature.
    PatternMatched,
    /// Tier 2 exact content-hash hit.
    CacheExact,
    /// Tier 2 accepted a semantically similar past analysis.
    CacheSemantic,
    /// Tier 3 produced a root cause at or above the confidence threshold.
    LlmResolved,
    /// Nothing informative matched and escalation was not available.
    NoMatch,
    /// The oracle or embedding provider failed or timed out.
    LlmFailure,
    /// The oracle answered with content that failed the schema check.
    LlmMalformed,
    /// The oracle asked for more evidence.
    LlmNeedMoreInfo,
    /// The oracle answered below the confidence threshold.
    LlmBelowThreshold,
    /// The oracle failed and the generic Tier 1 match was recorded instead.
    PatternFallback,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternMatched => "pattern_matched",
            Self::CacheExact => "cache_exact",
            Self::CacheSemantic => "cache_semantic",
            Self::LlmResolved => "llm_resolved",
            Self::NoMatch => "no_match",
            Self::LlmFailure => "llm_failure",
            Self::LlmMalformed => "llm_malformed",
            Self::LlmNeedMoreInfo => "llm_need_more_info",
            Self::LlmBelowThreshold => "llm_below_threshold",
            Self::PatternFallback => "pattern_fallback",
        }
    }

    /// Whether the job ended with a root cause assigned.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::PatternMatched
                | Self::CacheExact
                | Self::CacheSemantic
                | Self::LlmResolved
                | Self::PatternFallback
        )
    }
}

impl std::fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline did for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub job_id: i64,
    pub status: ClassificationStatus,
    /// Detection method of the final link row, if one was written.
    pub method: Option<DetectionMethod>,
    pub root_cause_id: Option<Uuid>,
    pub confidence: Option<f64>,
    /// Prompt cache entry touched by Tier 2, if Tier 2 ran.
    pub cache_entry_id: Option<Uuid>,
    /// The oracle's follow-up request when status is `llm_need_more_info`.
    pub more_info_request: Option<String>,
    /// Log lines the oracle asked for, if it named a number.
    pub requested_lines: Option<usize>,
    /// True when the full log was requested from the evidence source.
    pub full_log_requested: bool,
    /// True when the oracle was actually called.
    pub llm_invoked: bool,
    pub llm_tokens: u64,
    pub duration_ms: u64,
}

impl ClassificationResult {
    pub fn new(job_id: i64, status: ClassificationStatus) -> Self {
        Self {
            job_id,
            status,
            method: None,
            root_cause_id: None,
            confidence: None,
            cache_entry_id: None,
            more_info_request: None,
            requested_lines: None,
            full_log_requested: false,
            llm_invoked: false,
            llm_tokens: 0,
            duration_ms: 0,
        }
    }
}
