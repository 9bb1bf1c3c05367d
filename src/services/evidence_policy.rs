//! Decides when a full log download is worth it.

use crate::domain::models::{Escalation, JobRecord, JobRootCauseLink};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LazyEvidencePolicy {
    pub llm_enabled: bool,
    pub confidence_threshold: f64,
}

impl LazyEvidencePolicy {
    pub fn new(llm_enabled: bool, confidence_threshold: f64) -> Self {
        Self {
            llm_enabled,
            confidence_threshold,
        }
    }

    /// Full logs are fetched only when Tier 1 found nothing actionable, the
    /// LLM may run, and no cheaper tier reached the confidence threshold.
    pub fn needs_full_logs(&self, escalation: &Escalation) -> bool {
        let actionable = escalation.pattern.as_ref().is_some_and(|p| !p.is_generic());
        !actionable
            && self.llm_enabled
            && escalation
                .best_confidence()
                .is_none_or(|c| c < self.confidence_threshold)
    }

    /// Whether an already processed job should be classified again: its logs
    /// were unavailable and it holds no trustworthy root cause.
    pub fn qualifies_for_reprocessing(&self, job: &JobRecord, latest: Option<&JobRootCauseLink>) -> bool {
        if job.logs_accessible {
            return false;
        }
        match latest {
            None => true,
            Some(link) => {
                link.root_cause_id.is_none() || link.detection.confidence < self.confidence_threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        CacheHint, Detection, DetectionMethod, PatternMatch, GENERIC_FAILURE_CATEGORY,
    };
    use uuid::Uuid;

    fn pattern(category: &str, confidence: f64) -> PatternMatch {
        PatternMatch {
            rule_id: "r".to_string(),
            category: category.to_string(),
            title: "t".to_string(),
            description: String::new(),
            suggested_fix: None,
            confidence,
        }
    }

    fn hint(confidence: Option<f64>) -> CacheHint {
        CacheHint {
            entry_id: Uuid::new_v4(),
            category: "c".to_string(),
            title: "t".to_string(),
            similarity: 0.87,
            confidence,
            reuse_count: 0,
        }
    }

    #[test]
    fn test_generic_match_needs_logs() {
        let policy = LazyEvidencePolicy::new(true, 0.8);
        let esc = Escalation {
            pattern: Some(pattern(GENERIC_FAILURE_CATEGORY, 0.5)),
            ..Escalation::default()
        };
        assert!(policy.needs_full_logs(&esc));
        assert!(policy.needs_full_logs(&Escalation::default()));
    }

    #[test]
    fn test_disabled_llm_never_needs_logs() {
        let policy = LazyEvidencePolicy::new(false, 0.8);
        assert!(!policy.needs_full_logs(&Escalation::default()));
    }

    #[test]
    fn test_specific_match_never_needs_logs() {
        let policy = LazyEvidencePolicy::new(true, 0.8);
        let esc = Escalation {
            pattern: Some(pattern("dependency_missing", 0.6)),
            ..Escalation::default()
        };
        assert!(!policy.needs_full_logs(&esc));
    }

    #[test]
    fn test_confident_hint_skips_logs() {
        let policy = LazyEvidencePolicy::new(true, 0.8);
        let confident = Escalation {
            hint: Some(hint(Some(0.85))),
            ..Escalation::default()
        };
        assert!(!policy.needs_full_logs(&confident));

        let weak = Escalation {
            hint: Some(hint(Some(0.6))),
            ..Escalation::default()
        };
        assert!(policy.needs_full_logs(&weak));
    }

    #[test]
    fn test_reprocessing_rules() {
        let policy = LazyEvidencePolicy::new(true, 0.8);
        let mut job = JobRecord::new(1, 1, "build");
        assert!(!policy.qualifies_for_reprocessing(&job, None));

        job.logs_accessible = false;
        assert!(policy.qualifies_for_reprocessing(&job, None));

        let attempt = JobRootCauseLink::new(1, None, Detection::new(DetectionMethod::LlmMalformed, 0.0));
        assert!(policy.qualifies_for_reprocessing(&job, Some(&attempt)));

        let weak = JobRootCauseLink::new(1, Some(Uuid::new_v4()), Detection::new(DetectionMethod::Pattern, 0.5));
        assert!(policy.qualifies_for_reprocessing(&job, Some(&weak)));

        let strong = JobRootCauseLink::new(1, Some(Uuid::new_v4()), Detection::new(DetectionMethod::Llm, 0.92));
        assert!(!policy.qualifies_for_reprocessing(&job, Some(&strong)));
    }
}
