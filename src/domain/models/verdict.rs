//! Typed LLM verdicts and the schema check at the parse boundary.
//!
//! The oracle is expected to answer with a JSON object discriminated by
//! `type`: either `root_cause` or `need_more_info`. Anything else becomes a
//! [`VerdictError`], which the pipeline records as a malformed response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A successfully parsed LLM answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmVerdict {
    RootCause(RootCauseVerdict),
    NeedMoreInfo(MoreInfoRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseVerdict {
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "fix", alias = "suggestedFix")]
    pub suggested_fix: Option<String>,
    pub confidence: f64,
}

/// The oracle asking for more evidence before committing to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoreInfoRequest {
    /// What the oracle wants to see, in its own words.
    #[serde(alias = "reason")]
    pub request: String,
    /// Suggested number of log lines, if the oracle gave one.
    #[serde(default, alias = "lineCount")]
    pub lines: Option<usize>,
}

/// Why an oracle answer could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerdictError {
    #[error("empty response")]
    Empty,
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response JSON is not an object")]
    NotAnObject,
    #[error("response has no `type` field")]
    MissingType,
    #[error("unknown response type `{0}`")]
    UnknownType(String),
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Parse an oracle response into a verdict.
pub fn parse_verdict(content: &str) -> Result<LlmVerdict, VerdictError> {
    let body = strip_code_fences(content);
    if body.is_empty() {
        return Err(VerdictError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| VerdictError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(VerdictError::NotAnObject)?;

    let kind = object
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(VerdictError::MissingType)?;
    if kind != "root_cause" && kind != "need_more_info" {
        return Err(VerdictError::UnknownType(kind.to_string()));
    }

    let verdict: LlmVerdict = serde_json::from_value(value.clone()).map_err(|e| {
        VerdictError::InvalidField {
            field: "payload",
            reason: e.to_string(),
        }
    })?;

    match &verdict {
        LlmVerdict::RootCause(rc) => {
            if !(0.0..=1.0).contains(&rc.confidence) || rc.confidence.is_nan() {
                return Err(VerdictError::InvalidField {
                    field: "confidence",
                    reason: format!("{} is outside [0, 1]", rc.confidence),
                });
            }
            if rc.category.trim().is_empty() {
                return Err(VerdictError::InvalidField {
                    field: "category",
                    reason: "must not be empty".to_string(),
                });
            }
            if rc.title.trim().is_empty() {
                return Err(VerdictError::InvalidField {
                    field: "title",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        LlmVerdict::NeedMoreInfo(req) => {
            if req.request.trim().is_empty() {
                return Err(VerdictError::InvalidField {
                    field: "request",
                    reason: "must not be empty".to_string(),
                });
            }
        }
    }

    Ok(verdict)
}

/// Remove a surrounding Markdown code fence (with optional language tag).
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let rest = rest.find('\n').map_or(rest, |idx| &rest[idx + 1..]);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
