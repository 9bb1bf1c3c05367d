//! Domain errors for the citriage classification pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while classifying CI failures.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Root cause not found: {0}")]
    RootCauseNotFound(Uuid),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Prompt cache entry not found: {0}")]
    CacheEntryNotFound(Uuid),

    #[error("Evidence unavailable for job {job_id}: {reason}")]
    EvidenceUnavailable { job_id: i64, reason: String },

    #[error("Invalid pipeline transition from {from} on {observation}")]
    InvalidStateTransition { from: String, observation: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::ExecutionFailed(err.to_string())
    }
}
