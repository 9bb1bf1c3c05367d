//! Failure context: the normalized text that is hashed and embedded.
//!
//! Two jobs whose contexts are byte-identical share a hash and are treated as
//! the same failure by the semantic cache. Only fields that describe the
//! failure go in; run and job ids never do.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use super::job::JobEvidence;

static LOG_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z\s?")
        .expect("timestamp pattern compiles")
});

/// Normalized failure description plus its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    text: String,
    hash: String,
}

impl FailureContext {
    /// Build the context for a job from its cheap evidence and an optional
    /// log excerpt.
    pub fn build(evidence: &JobEvidence, log_excerpt: &str) -> Self {
        let mut text = String::new();
        text.push_str(&format!("workflow: {}\n", evidence.run.workflow_name));
        text.push_str(&format!("job: {}\n", evidence.job.name));

        if !evidence.annotations.is_empty() {
            text.push_str("errors:\n");
            for annotation in &evidence.annotations {
                match annotation.title.as_deref().filter(|t| !t.is_empty()) {
                    Some(title) => {
                        text.push_str(&format!("- [{}] {}\n", title, annotation.message.trim()));
                    }
                    None => text.push_str(&format!("- {}\n", annotation.message.trim())),
                }
            }
        }

        if !evidence.failed_steps.is_empty() {
            text.push_str("failed steps:\n");
            for step in &evidence.failed_steps {
                text.push_str(&format!("- {}\n", step.name));
            }
        }

        let excerpt = normalize_log(log_excerpt);
        if !excerpt.is_empty() {
            text.push_str("log excerpt:\n");
            text.push_str(&excerpt);
            text.push('\n');
        }

        Self::from_text(text)
    }

    /// Wrap already-built context text.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self { text, hash }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Hex SHA-256 of the context text.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Hex SHA-256 digest of a string.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Strip leading ISO-8601 timestamps and trailing whitespace from log lines
/// and drop blank lines at either end.
pub fn normalize_log(log: &str) -> String {
    let lines: Vec<String> = log
        .lines()
        .map(|line| LOG_TIMESTAMP.replace(line, "").trim_end().to_string())
        .collect();

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

/// Last `count` lines of a log.
pub fn tail_lines(log: &str, count: usize) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let skip = lines.len().saturating_sub(count);
    lines[skip..].join("\n")
}
