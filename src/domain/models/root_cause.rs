//! Root cause catalog model.
//!
//! A root cause is a deduplicated failure class. `(category, title)` is the
//! natural key: every tier that resolves a job either finds the existing row
//! for that pair or creates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default per-cause confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Maximum length of a root cause title, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Which tier first created a root cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    /// Created by a deterministic signature rule.
    Pattern,
    /// Created from an accepted LLM analysis.
    Llm,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Llm => "llm",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pattern" => Some(Self::Pattern),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a stored root cause embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Provider that produced the vector (e.g. "openai", "hashing").
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Vector length.
    pub dimensions: usize,
    /// When the vector was generated.
    pub generated_at: DateTime<Utc>,
}

/// A catalog entry representing a deduplicated failure class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    pub id: Uuid,
    pub category: String,
    pub title: String,
    pub description: String,
    pub suggested_fix: Option<String>,
    pub confidence_threshold: f64,
    /// Number of detections that resolved to this cause. Always at least 1.
    pub occurrence_count: u64,
    pub discovery_method: DiscoveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub embedding_metadata: Option<EmbeddingMetadata>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RootCause {
    /// Build a fresh catalog row from a candidate. The first detection counts
    /// as the first occurrence.
    pub fn from_candidate(candidate: &RootCauseCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category: candidate.category.clone(),
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            suggested_fix: candidate.suggested_fix.clone(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            occurrence_count: 1,
            discovery_method: candidate.discovery_method,
            embedding: None,
            embedding_metadata: None,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text used when embedding this cause.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}\n{}", self.category, self.title, self.description)
    }
}

/// A proposed root cause, produced by a pattern rule or an LLM verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseCandidate {
    pub category: String,
    pub title: String,
    pub description: String,
    pub suggested_fix: Option<String>,
    /// Confidence reported by the tier that proposed it.
    pub confidence: f64,
    pub discovery_method: DiscoveryMethod,
}

impl RootCauseCandidate {
    /// Create a normalized candidate.
    ///
    /// Categories are lowercased with whitespace collapsed to underscores so
    /// that `"Dependency Missing"` and `"dependency_missing"` share a key.
    /// Titles are trimmed and capped at [`MAX_TITLE_LEN`] characters.
    pub fn new(
        category: impl AsRef<str>,
        title: impl AsRef<str>,
        description: impl Into<String>,
        suggested_fix: Option<String>,
        confidence: f64,
        discovery_method: DiscoveryMethod,
    ) -> Self {
        Self {
            category: normalize_category(category.as_ref()),
            title: truncate_title(title.as_ref()),
            description: description.into(),
            suggested_fix: suggested_fix.filter(|f| !f.trim().is_empty()),
            confidence: confidence.clamp(0.0, 1.0),
            discovery_method,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.category.is_empty() {
            return Err("root cause category cannot be empty".to_string());
        }
        if self.title.is_empty() {
            return Err("root cause title cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Result of an insert-or-fetch on the catalog.
#[derive(Debug, Clone)]
pub struct FoundRootCause {
    pub root_cause: RootCause,
    /// True when this call inserted the row.
    pub created: bool,
}

fn normalize_category(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn truncate_title(raw: &str) -> String {
    raw.trim().chars().take(MAX_TITLE_LEN).collect()
}
