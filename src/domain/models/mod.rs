pub mod classification;
pub mod config;
pub mod detection;
pub mod failure_context;
pub mod job;
pub mod pattern;
pub mod pipeline;
pub mod prompt_cache;
pub mod root_cause;
pub mod verdict;

pub use classification::{ClassificationResult, ClassificationStatus};
pub use config::{
    Config, DatabaseConfig, EmbeddingConfig, EvidenceConfig, LlmConfig, LoggingConfig,
    SemanticSearchConfig,
};
pub use detection::{Detection, DetectionMethod, JobRootCauseLink};
pub use failure_context::{content_hash, normalize_log, tail_lines, FailureContext};
pub use job::{Annotation, FailedStep, JobEvidence, JobRecord, WorkflowRun};
pub use pattern::{PatternMatch, GENERIC_FAILURE_CATEGORY};
pub use pipeline::{
    advance, CacheHint, CacheProbe, Conclusion, Effect, Escalation, LogAvailability, Observation,
    OracleReply, OutcomeCause, PendingOutcome, PipelineState, SimilarCandidate, TierPolicy,
    Transition,
};
pub use prompt_cache::{
    CacheOutcome, NewPromptCacheEntry, PromptCacheEntry, PromptCacheStats, SimilarEntry,
    SEMANTIC_REUSE_MODEL,
};
pub use root_cause::{
    DiscoveryMethod, EmbeddingMetadata, FoundRootCause, RootCause, RootCauseCandidate,
    DEFAULT_CONFIDENCE_THRESHOLD, MAX_TITLE_LEN,
};
pub use verdict::{parse_verdict, LlmVerdict, MoreInfoRequest, RootCauseVerdict, VerdictError};
