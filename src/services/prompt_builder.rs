//! Provider-agnostic conversation for Tier 3.

use serde::Serialize;

use crate::domain::models::{Annotation, CacheHint, FailedStep, JobEvidence, MoreInfoRequest};
use crate::domain::ports::ChatMessage;

const SYSTEM_PROMPT: &str = r#"You are a CI failure analyst. Identify the single root cause of a failed CI job from the evidence provided.

Reply with one JSON object and nothing else. Use one of these two shapes:

{"type": "root_cause", "category": "<snake_case category>", "title": "<short title>", "description": "<what went wrong>", "suggested_fix": "<how to fix it>", "confidence": <0.0-1.0>}

{"type": "need_more_info", "request": "<what evidence you need>", "lines": <number of log lines wanted>}

Prefer existing categories such as dependency_missing, compilation_error, test_failure, lint_failure, infrastructure, network, permission, timeout, resource_exhaustion, configuration. Only ask for more information when the evidence is genuinely insufficient."#;

/// Annotation with the provider payload stripped.
#[derive(Debug, Serialize)]
struct PromptAnnotation<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<String>,
}

impl<'a> From<&'a Annotation> for PromptAnnotation<'a> {
    fn from(a: &'a Annotation) -> Self {
        let lines = match (a.start_line, a.end_line) {
            (Some(start), Some(end)) if end != start => Some(format!("{start}-{end}")),
            (Some(start), _) => Some(start.to_string()),
            _ => None,
        };
        Self {
            message: &a.message,
            title: a.title.as_deref(),
            path: a.path.as_deref(),
            lines,
        }
    }
}

#[derive(Debug, Serialize)]
struct PromptStep<'a> {
    name: &'a str,
    status: &'a str,
}

impl<'a> From<&'a FailedStep> for PromptStep<'a> {
    fn from(s: &'a FailedStep) -> Self {
        Self {
            name: &s.name,
            status: &s.status,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// System and user turns for one oracle call.
    pub fn build(
        &self,
        evidence: &JobEvidence,
        log_excerpt: &str,
        hint: Option<&CacheHint>,
        follow_up: Option<&MoreInfoRequest>,
    ) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(self.user_turn(evidence, log_excerpt, hint, follow_up)),
        ]
    }

    fn user_turn(
        &self,
        evidence: &JobEvidence,
        log_excerpt: &str,
        hint: Option<&CacheHint>,
        follow_up: Option<&MoreInfoRequest>,
    ) -> String {
        let annotations: Vec<PromptAnnotation<'_>> = evidence.annotations.iter().map(Into::into).collect();
        let steps: Vec<PromptStep<'_>> = evidence.failed_steps.iter().map(Into::into).collect();

        let mut out = String::new();
        out.push_str(&format!("Repository: {}\n", evidence.run.repository));
        out.push_str(&format!(
            "Workflow: {} (run {})\n",
            evidence.run.workflow_name, evidence.run.id
        ));
        out.push_str(&format!("Job: {} (id {})\n", evidence.job.name, evidence.job.id));
        if let Some(branch) = &evidence.run.head_branch {
            out.push_str(&format!("Branch: {branch}\n"));
        }

        out.push_str("\nError annotations:\n");
        out.push_str(&to_json_or_placeholder(&annotations));
        out.push_str("\n\nFailed steps:\n");
        out.push_str(&to_json_or_placeholder(&steps));
        out.push('\n');

        if let Some(hint) = hint {
            out.push_str(&format!(
                "\nA similar past failure was classified as \"{}\" ({}), similarity {:.2}",
                hint.title, hint.category, hint.similarity
            ));
            if let Some(confidence) = hint.confidence {
                out.push_str(&format!(", confidence {confidence:.2}"));
            }
            out.push_str(&format!(
                ", reused {} times. Treat this as a lead to verify, not as the answer.\n",
                hint.reuse_count
            ));
        }

        if let Some(request) = follow_up {
            out.push_str(&format!(
                "\nYou previously asked: {}\nThe log excerpt below has been extended.\n",
                request.request
            ));
        }

        out.push_str("\nLog excerpt:\n");
        if log_excerpt.trim().is_empty() {
            out.push_str("(no log available)\n");
        } else {
            out.push_str("```\n");
            out.push_str(log_excerpt);
            out.push_str("\n```\n");
        }
        out
    }
}

fn to_json_or_placeholder<T: Serialize>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "(unavailable)".to_string())
}
