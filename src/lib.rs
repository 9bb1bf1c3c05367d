//! citriage - tiered root cause classification for CI failures
//!
//! citriage takes the failed jobs of a CI workflow run and assigns each one a
//! root cause from a shared, deduplicated catalog. Evidence is escalated
//! lazily through three tiers, from cheapest to most expensive:
//!
//! 1. deterministic failure signatures over annotations and step names,
//! 2. a prompt cache keyed by content hash and embedding similarity,
//! 3. an LLM oracle asked for a structured verdict.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, the pipeline state machine and port traits
//! - **Adapter Layer** (`adapters`): SQLite storage, embedding providers, LLM oracles, evidence sources
//! - **Service Layer** (`services`): the tiers and the run-level orchestration
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use citriage::cli::AppContext;
//! use citriage::adapters::evidence::{FileEvidenceSource, RunManifest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = citriage::ConfigLoader::load()?;
//!     let ctx = AppContext::open(&config).await?;
//!     let manifest = RunManifest::load("run.yaml".as_ref())?;
//!     let (run, jobs) = (manifest.run.clone(), manifest.job_records());
//!     let source = FileEvidenceSource::new(None).with_manifest(manifest);
//!     let report = ctx.processor.process_run(&run, &jobs, &source).await?;
//!     println!("{} resolved", report.metrics.resolved);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ClassificationResult, ClassificationStatus, Config, DetectionMethod, JobEvidence, JobRecord,
    RootCause, WorkflowRun,
};
pub use domain::ports::{EmbeddingProvider, EvidenceSource, JobRepository, KnowledgeStore, LlmOracle};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{PatternMatcher, RootCauseClassifier, RunProcessor};
