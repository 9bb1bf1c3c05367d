use serde::{Deserialize, Serialize};

use super::pipeline::TierPolicy;

/// Main configuration structure for citriage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// LLM escalation (Tier 3)
    #[serde(default)]
    pub llm: LlmConfig,

    /// Semantic cache (Tier 2)
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    /// Embedding provider used by the semantic cache
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Log excerpt sizing
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

impl Config {
    /// Decision knobs handed to the pipeline state machine.
    pub fn tier_policy(&self) -> TierPolicy {
        TierPolicy {
            llm_enabled: self.llm.enabled,
            llm_confidence_threshold: self.llm.confidence_threshold,
            accept_similarity: self.semantic_search.accept_similarity,
            accept_reuse_count: self.semantic_search.accept_reuse_count,
            fallback_to_pattern: self.llm.fallback_to_pattern,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".citriage/citriage.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_true")]
    pub enable_console: bool,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_console: true,
            rotation: default_rotation(),
        }
    }
}

/// LLM escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Allow escalation past the pattern tier
    #[serde(default)]
    pub enabled: bool,

    /// Oracle backend: anthropic or openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier; provider default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// API key; falls back to the provider's environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Minimum verdict confidence to accept a root cause
    #[serde(default = "default_llm_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Record the generic pattern match when the oracle is unreachable
    #[serde(default)]
    pub fallback_to_pattern: bool,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Extra attempts granted to `need_more_info` answers
    #[serde(default = "default_max_follow_up_attempts")]
    pub max_follow_up_attempts: u32,

    /// Client-side rate limit; unlimited when unset
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}

const fn default_llm_confidence_threshold() -> f64 {
    0.8
}

const fn default_llm_timeout_secs() -> u64 {
    60
}

const fn default_llm_max_tokens() -> u32 {
    2048
}

const fn default_max_follow_up_attempts() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_llm_provider(),
            model: None,
            api_key: None,
            base_url: None,
            confidence_threshold: default_llm_confidence_threshold(),
            fallback_to_pattern: false,
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_llm_max_tokens(),
            max_follow_up_attempts: default_max_follow_up_attempts(),
            requests_per_minute: None,
        }
    }
}

/// Semantic cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SemanticSearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum cosine similarity for a search hit
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f64,

    #[serde(default = "default_similarity_limit")]
    pub limit: usize,

    /// Similarity at which a hit is reused without the LLM
    #[serde(default = "default_accept_similarity")]
    pub accept_similarity: f64,

    /// Prior reuse count at which a hit is reused without the LLM
    #[serde(default = "default_accept_reuse_count")]
    pub accept_reuse_count: u64,
}

const fn default_similarity_threshold() -> f64 {
    0.85
}

const fn default_similarity_limit() -> usize {
    5
}

const fn default_accept_similarity() -> f64 {
    0.90
}

const fn default_accept_reuse_count() -> u64 {
    3
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_similarity_threshold(),
            limit: default_similarity_limit(),
            accept_similarity: default_accept_similarity(),
            accept_reuse_count: default_accept_reuse_count(),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    /// hashing (local, offline) or openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}

const fn default_embedding_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dimension: default_embedding_dimension(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Log excerpt sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvidenceConfig {
    /// Tail size of the cheap excerpt used to build the failure context
    #[serde(default = "default_initial_log_lines")]
    pub initial_log_lines: usize,

    /// Tail size taken from a downloaded full log for the LLM prompt
    #[serde(default = "default_full_log_lines")]
    pub full_log_lines: usize,

    /// Excerpt multiplier applied on each `need_more_info` follow-up
    #[serde(default = "default_follow_up_growth")]
    pub follow_up_growth: usize,
}

const fn default_initial_log_lines() -> usize {
    50
}

const fn default_full_log_lines() -> usize {
    400
}

const fn default_follow_up_growth() -> usize {
    2
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            initial_log_lines: default_initial_log_lines(),
            full_log_lines: default_full_log_lines(),
            follow_up_growth: default_follow_up_growth(),
        }
    }
}
