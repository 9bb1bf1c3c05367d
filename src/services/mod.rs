//! Classification services built on the domain ports.

pub mod classifier;
pub mod evidence_policy;
pub mod pattern_matcher;
pub mod prompt_builder;
pub mod run_processor;
pub mod semantic_cache;

pub use classifier::{ClassifierSettings, ClassifyOptions, RootCauseClassifier};
pub use evidence_policy::LazyEvidencePolicy;
pub use pattern_matcher::{builtin_rules, PatternMatcher, PatternRule};
pub use prompt_builder::PromptBuilder;
pub use run_processor::{EfficiencyMetrics, FollowUpPolicy, JobFailure, RunProcessor, RunReport};
pub use semantic_cache::{SemanticCache, SemanticCacheSettings};
