//! Signature-rule match results.

use serde::{Deserialize, Serialize};

use super::root_cause::{DiscoveryMethod, RootCauseCandidate};

/// Category of the catch-all rule that matches a bare non-zero exit code.
/// A match in this category is uninformative and never short-circuits
/// escalation.
pub const GENERIC_FAILURE_CATEGORY: &str = "generic_failure";

/// The first signature rule that matched a job's evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub rule_id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub suggested_fix: Option<String>,
    pub confidence: f64,
}

impl PatternMatch {
    pub fn is_generic(&self) -> bool {
        self.category == GENERIC_FAILURE_CATEGORY
    }

    pub fn to_candidate(&self) -> RootCauseCandidate {
        RootCauseCandidate::new(
            &self.category,
            &self.title,
            self.description.clone(),
            self.suggested_fix.clone(),
            self.confidence,
            DiscoveryMethod::Pattern,
        )
    }
}
