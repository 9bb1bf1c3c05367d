use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::adapters::oracles::KNOWN_PROVIDERS;
use crate::domain::models::config::Config;

const EMBEDDING_PROVIDERS: &[&str] = &["hashing", "openai"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];
const LOG_ROTATIONS: &[&str] = &["daily", "hourly", "never"];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid {name}: {value}. Must be between 0 and 1")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid semantic_search.limit: must be at least 1")]
    InvalidSearchLimit,

    #[error("Invalid evidence.{0}: must be at least 1")]
    InvalidLineCount(&'static str),

    #[error("Unknown {kind} provider: {value}")]
    UnknownProvider { kind: &'static str, value: String },

    #[error("Invalid embedding.dimension: must be at least 1")]
    InvalidDimension,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .citriage/config.yaml (project config, created by init)
    /// 3. .citriage/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CITRIAGE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `dir` instead of the
    /// working directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let root = dir.as_ref().join(".citriage");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join("config.yaml")))
            .merge(Yaml::file(root.join("local.yaml")))
            .merge(Env::prefixed("CITRIAGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; env overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CITRIAGE_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if !LOG_ROTATIONS.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        for (name, value) in [
            ("llm.confidence_threshold", config.llm.confidence_threshold),
            ("semantic_search.threshold", config.semantic_search.threshold),
            (
                "semantic_search.accept_similarity",
                config.semantic_search.accept_similarity,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if config.semantic_search.limit == 0 {
            return Err(ConfigError::InvalidSearchLimit);
        }
        if config.evidence.initial_log_lines == 0 {
            return Err(ConfigError::InvalidLineCount("initial_log_lines"));
        }
        if config.evidence.full_log_lines == 0 {
            return Err(ConfigError::InvalidLineCount("full_log_lines"));
        }

        if !KNOWN_PROVIDERS.contains(&config.llm.provider.as_str()) {
            return Err(ConfigError::UnknownProvider {
                kind: "llm",
                value: config.llm.provider.clone(),
            });
        }
        if !EMBEDDING_PROVIDERS.contains(&config.embedding.provider.as_str()) {
            return Err(ConfigError::UnknownProvider {
                kind: "embedding",
                value: config.embedding.provider.clone(),
            });
        }
        if config.embedding.dimension == 0 {
            return Err(ConfigError::InvalidDimension);
        }

        Ok(())
    }

    /// YAML written by `citriage init`.
    pub fn default_yaml() -> Result<String> {
        serde_yaml::to_string(&Config::default()).context("Failed to serialize default config")
    }
}
