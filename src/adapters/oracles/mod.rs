//! LLM oracle adapters and the provider registry.

pub mod anthropic;
pub mod mock;
pub mod openai_chat;
pub mod rate_limited;

pub use anthropic::{AnthropicConfig, AnthropicOracle};
pub use mock::{ScriptedOracle, ScriptedReply};
pub use openai_chat::{OpenAiChatConfig, OpenAiChatOracle};
pub use rate_limited::RateLimitedOracle;

use reqwest::StatusCode;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::models::LlmConfig;
use crate::domain::ports::{LlmOracle, OracleError};

/// Map a non-success HTTP status to an oracle error.
pub(crate) fn classify_status(status: StatusCode, body: String) -> OracleError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OracleError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited,
        _ => OracleError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Oracle providers understood by `llm.provider`.
pub const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai"];

/// Build the oracle named by `llm.provider`, rate limited when
/// `llm.requests_per_minute` is set.
pub fn build_oracle(config: &LlmConfig) -> Result<Arc<dyn LlmOracle>, OracleError> {
    let oracle: Arc<dyn LlmOracle> = match config.provider.as_str() {
        "anthropic" => {
            let defaults = AnthropicConfig::default();
            Arc::new(AnthropicOracle::new(AnthropicConfig {
                api_key: config.api_key.clone(),
                base_url: config.base_url.clone().unwrap_or(defaults.base_url),
                model: config.model.clone().unwrap_or(defaults.model),
                timeout_secs: config.timeout_secs,
                max_tokens: config.max_tokens,
                ..defaults
            })?)
        }
        "openai" => {
            let defaults = OpenAiChatConfig::default();
            Arc::new(OpenAiChatOracle::new(OpenAiChatConfig {
                api_key: config.api_key.clone(),
                base_url: config.base_url.clone().unwrap_or(defaults.base_url),
                model: config.model.clone().unwrap_or(defaults.model),
                timeout_secs: config.timeout_secs,
                max_tokens: config.max_tokens,
            })?)
        }
        other => {
            return Err(OracleError::NotConfigured(format!(
                "unknown llm provider '{other}', expected one of: {}",
                KNOWN_PROVIDERS.join(", ")
            )))
        }
    };

    Ok(match config.requests_per_minute.and_then(NonZeroU32::new) {
        Some(rpm) => Arc::new(RateLimitedOracle::new(oracle, rpm)),
        None => oracle,
    })
}
