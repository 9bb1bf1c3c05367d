//! LLM oracle port.
//!
//! An oracle is any chat-completion backend. It knows nothing about root
//! causes: it takes a conversation and returns text plus token usage.
//! Transport problems are reported as [`OracleError`], never as content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub provider: String,
}

/// Transport-level oracle failures.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Network(format!("timeout: {err}"))
        } else {
            OracleError::Network(err.to_string())
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmOracle: Send + Sync {
    /// Provider name (e.g., "anthropic", "openai").
    fn name(&self) -> &'static str;

    /// Model the oracle will ask for.
    fn model(&self) -> &str;

    /// Send a conversation and wait for the full reply.
    async fn send(&self, messages: &[ChatMessage]) -> Result<OracleResponse, OracleError>;
}
