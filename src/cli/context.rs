//! Wiring of adapters and services from configuration.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::embeddings::build_embedding_provider;
use crate::adapters::oracles::build_oracle;
use crate::adapters::sqlite::{
    initialize_database, SqliteJobRepository, SqliteKnowledgeStore, SqlitePromptCacheRepository,
};
use crate::domain::models::Config;
use crate::services::{
    ClassifierSettings, FollowUpPolicy, PatternMatcher, RootCauseClassifier, RunProcessor,
    SemanticCache, SemanticCacheSettings,
};

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    pub knowledge: Arc<SqliteKnowledgeStore>,
    pub cache_entries: Arc<SqlitePromptCacheRepository>,
    pub jobs: Arc<SqliteJobRepository>,
    pub processor: RunProcessor,
}

impl AppContext {
    pub async fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let pool = initialize_database(&config.database.path, config.database.max_connections)
            .await
            .context("Failed to open database")?;
        let knowledge = Arc::new(SqliteKnowledgeStore::new(pool.clone()));
        let cache_entries = Arc::new(SqlitePromptCacheRepository::new(pool.clone()));
        let jobs = Arc::new(SqliteJobRepository::new(pool));

        let matcher = PatternMatcher::builtin().context("Failed to compile pattern rules")?;
        let mut classifier = RootCauseClassifier::new(
            matcher,
            knowledge.clone(),
            jobs.clone(),
            ClassifierSettings::from_config(config),
        );

        if config.semantic_search.enabled {
            let embedder =
                build_embedding_provider(&config.embedding).context("Failed to build embedding provider")?;
            classifier = classifier.with_semantic_cache(SemanticCache::new(
                cache_entries.clone(),
                knowledge.clone(),
                embedder,
                SemanticCacheSettings {
                    threshold: config.semantic_search.threshold,
                    limit: config.semantic_search.limit,
                },
            ));
        }

        if config.llm.enabled {
            let oracle = build_oracle(&config.llm).context("Failed to build LLM oracle")?;
            tracing::debug!(provider = oracle.name(), model = oracle.model(), "llm escalation enabled");
            classifier = classifier.with_oracle(oracle);
        }

        let processor = RunProcessor::new(Arc::new(classifier), jobs.clone(), knowledge.clone()).with_follow_up(
            FollowUpPolicy {
                max_attempts: config.llm.max_follow_up_attempts,
                growth: config.evidence.follow_up_growth,
            },
        );

        Ok(Self {
            knowledge,
            cache_entries,
            jobs,
            processor,
        })
    }
}
