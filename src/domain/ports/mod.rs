//! Port trait definitions (Hexagonal Architecture)
//!
//! Async interfaces that adapters implement:
//! - KnowledgeStore: root cause catalog and detection links
//! - PromptCacheRepository: semantic cache persistence
//! - JobRepository: runs, jobs and ingested evidence
//! - EmbeddingProvider: text to vector
//! - LlmOracle: chat-completion backends
//! - EvidenceSource: annotations, steps and logs from the CI provider

pub mod embedding;
pub mod evidence_source;
pub mod job_repository;
pub mod knowledge_store;
pub mod llm_oracle;
pub mod prompt_cache_repository;

pub use embedding::{Embedding, EmbeddingProvider};
pub use evidence_source::EvidenceSource;
pub use job_repository::JobRepository;
pub use knowledge_store::KnowledgeStore;
pub use llm_oracle::{
    ChatMessage, ChatRole, LlmOracle, OracleError, OracleResponse, TokenUsage,
};
pub use prompt_cache_repository::PromptCacheRepository;
