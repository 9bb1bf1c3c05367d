//! Anthropic Messages API oracle.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::classify_status;
use crate::domain::ports::{ChatMessage, ChatRole, LlmOracle, OracleError, OracleResponse, TokenUsage};

/// Configuration for the Anthropic oracle.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (will be read from ANTHROPIC_API_KEY env if not set).
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    pub model: String,
    /// API version header.
    pub api_version: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Max tokens to generate.
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_version: "2023-06-01".to_string(),
            timeout_secs: 60,
            max_tokens: 2048,
        }
    }
}

impl AnthropicConfig {
    /// Get API key from config or environment.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

pub struct AnthropicOracle {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicOracle {
    pub fn new(config: AnthropicConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// System turns are joined into the top-level `system` field; the API
    /// only accepts user and assistant turns in `messages`.
    fn build_request<'a>(&'a self, messages: &'a [ChatMessage]) -> MessagesRequest<'a> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: turns,
            temperature: 0.0,
        }
    }
}

#[async_trait]
impl LlmOracle for AnthropicOracle {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<OracleResponse, OracleError> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| OracleError::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&self.build_request(messages))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let content = result
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(OracleResponse {
            content,
            usage: TokenUsage::new(result.usage.input_tokens, result.usage.output_tokens),
            model: result.model,
            provider: self.name().to_string(),
        })
    }
}
