//! Detection events linking jobs to root causes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a job's classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Pattern,
    PromptCacheExact,
    PromptSemanticSearch,
    Llm,
    LlmMalformed,
    LlmNeedMoreInfo,
    LlmBelowThreshold,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::PromptCacheExact => "prompt_cache_exact",
            Self::PromptSemanticSearch => "prompt_semantic_search",
            Self::Llm => "llm",
            Self::LlmMalformed => "llm_malformed",
            Self::LlmNeedMoreInfo => "llm_need_more_info",
            Self::LlmBelowThreshold => "llm_below_threshold",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pattern" => Some(Self::Pattern),
            "prompt_cache_exact" => Some(Self::PromptCacheExact),
            "prompt_semantic_search" => Some(Self::PromptSemanticSearch),
            "llm" => Some(Self::Llm),
            "llm_malformed" => Some(Self::LlmMalformed),
            "llm_need_more_info" => Some(Self::LlmNeedMoreInfo),
            "llm_below_threshold" => Some(Self::LlmBelowThreshold),
            _ => None,
        }
    }

    /// Whether this method means an LLM call was paid for.
    pub fn spent_llm(&self) -> bool {
        matches!(
            self,
            Self::Llm | Self::LlmMalformed | Self::LlmNeedMoreInfo | Self::LlmBelowThreshold
        )
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything recorded about one detection, independent of which cause it
/// resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub method: DetectionMethod,
    pub confidence: f64,
    pub llm_model: Option<String>,
    pub llm_tokens: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Opaque analysis payload, usually the raw LLM response or a JSON summary.
    pub raw_analysis: Option<String>,
}

impl Detection {
    pub fn new(method: DetectionMethod, confidence: f64) -> Self {
        Self {
            method,
            confidence: confidence.clamp(0.0, 1.0),
            llm_model: None,
            llm_tokens: None,
            duration_ms: None,
            raw_analysis: None,
        }
    }

    pub fn with_llm(mut self, model: impl Into<String>, tokens: u64, duration_ms: u64) -> Self {
        self.llm_model = Some(model.into());
        self.llm_tokens = Some(tokens);
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_analysis = Some(raw.into());
        self
    }
}

/// One append-only detection row.
///
/// `root_cause_id` is `None` when analysis was attempted but no cause was
/// assigned (malformed, need-more-info, or below-threshold LLM results). The
/// most recent link per job is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRootCauseLink {
    pub id: Uuid,
    pub job_id: i64,
    pub root_cause_id: Option<Uuid>,
    #[serde(flatten)]
    pub detection: Detection,
    pub created_at: DateTime<Utc>,
}

impl JobRootCauseLink {
    pub fn new(job_id: i64, root_cause_id: Option<Uuid>, detection: Detection) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            root_cause_id,
            detection,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_strings_round_trip() {
        for method in [
            DetectionMethod::Pattern,
            DetectionMethod::PromptCacheExact,
            DetectionMethod::PromptSemanticSearch,
            DetectionMethod::Llm,
            DetectionMethod::LlmMalformed,
            DetectionMethod::LlmNeedMoreInfo,
            DetectionMethod::LlmBelowThreshold,
        ] {
            assert_eq!(DetectionMethod::from_str(method.as_str()), Some(method));
        }
    }

    #[test]
    fn test_spent_llm() {
        assert!(!DetectionMethod::Pattern.spent_llm());
        assert!(!DetectionMethod::PromptSemanticSearch.spent_llm());
        assert!(DetectionMethod::LlmBelowThreshold.spent_llm());
    }
}
