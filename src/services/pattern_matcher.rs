//! Tier 1: deterministic failure signatures.
//!
//! Rules are evaluated in declaration order and the first match wins, so the
//! order of [`builtin_rules`] encodes priority. Specific signatures come first;
//! the bare non-zero exit code rule is last and only marks a failure as
//! "matched but uninformative".

use regex::{Regex, RegexBuilder};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Annotation, FailedStep, PatternMatch, GENERIC_FAILURE_CATEGORY};

/// A single failure signature.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: String,
    pub regex: Regex,
    pub category: String,
    pub title: String,
    pub confidence: f64,
    pub description: String,
    pub suggested_fix: Option<String>,
}

impl PatternRule {
    /// Compile a case-insensitive rule.
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        category: impl Into<String>,
        title: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            id: id.into(),
            regex,
            category: category.into(),
            title: title.into(),
            confidence: confidence.clamp(0.0, 1.0),
            description: String::new(),
            suggested_fix: None,
        })
    }

    pub fn describe(mut self, description: impl Into<String>, fix: Option<&str>) -> Self {
        self.description = description.into();
        self.suggested_fix = fix.map(str::to_string);
        self
    }

    fn to_match(&self) -> PatternMatch {
        PatternMatch {
            rule_id: self.id.clone(),
            category: self.category.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            suggested_fix: self.suggested_fix.clone(),
            confidence: self.confidence,
        }
    }
}

/// Ordered rule set. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

impl PatternMatcher {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    /// Matcher over the built-in rule library.
    pub fn builtin() -> DomainResult<Self> {
        builtin_rules()
            .map(Self::new)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid built-in pattern: {e}")))
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// First rule matching the combined annotation and step text.
    pub fn match_failure(&self, annotations: &[Annotation], steps: &[FailedStep]) -> Option<PatternMatch> {
        let text = combined_text(annotations, steps);
        if text.is_empty() {
            return None;
        }

        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(&text))
            .map(PatternRule::to_match)
    }
}

/// Annotations first, then step names, each in input order.
fn combined_text(annotations: &[Annotation], steps: &[FailedStep]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(annotations.len() * 2 + steps.len());
    for annotation in annotations {
        parts.push(&annotation.message);
        if let Some(title) = annotation.title.as_deref() {
            parts.push(title);
        }
    }
    parts.extend(steps.iter().map(|s| s.name.as_str()));
    parts.retain(|p| !p.trim().is_empty());
    parts.join("\n")
}

/// The built-in signature library, most specific first.
pub fn builtin_rules() -> Result<Vec<PatternRule>, regex::Error> {
    Ok(vec![
        PatternRule::new(
            "api_rate_limit",
            r"API rate limit exceeded|secondary rate limit|429 Too Many Requests",
            "infrastructure",
            "API Rate Limit Exceeded",
            1.0,
        )?
        .describe(
            "A request to a hosted API was rejected because the rate limit was exhausted.",
            Some("Retry later, authenticate the request, or reduce API calls in the workflow."),
        ),
        PatternRule::new(
            "out_of_memory",
            r"JavaScript heap out of memory|OOMKilled|Cannot allocate memory|exit code 137\b",
            "resource_exhaustion",
            "Out Of Memory",
            0.95,
        )?
        .describe(
            "A process was killed or aborted after running out of memory.",
            Some("Raise the memory limit (for Node: --max-old-space-size) or use a larger runner."),
        ),
        PatternRule::new(
            "disk_full",
            r"No space left on device|ENOSPC",
            "resource_exhaustion",
            "Disk Space Exhausted",
            0.95,
        )?
        .describe(
            "The runner ran out of disk space.",
            Some("Clean build caches or docker images before the failing step."),
        ),
        PatternRule::new(
            "job_timeout",
            r"exceeded the maximum execution time|has timed out|The operation was canceled",
            "timeout",
            "Job Timed Out",
            0.85,
        )?
        .describe(
            "The job or step hit its time limit and was cancelled.",
            Some("Raise timeout-minutes or find the step that hangs."),
        ),
        PatternRule::new(
            "npm_eresolve",
            r"npm ERR! code ERESOLVE|ERESOLVE unable to resolve dependency tree",
            "dependency_missing",
            "NPM Install Failed",
            0.9,
        )?
        .describe(
            "npm could not resolve a consistent dependency tree because of conflicting peer dependencies.",
            Some("Align the conflicting peer dependency versions or install with --legacy-peer-deps."),
        ),
        PatternRule::new(
            "module_not_found",
            r"Cannot find module|ModuleNotFoundError|No module named",
            "dependency_missing",
            "Module Not Found",
            0.85,
        )?
        .describe(
            "A module imported at runtime is not installed.",
            Some("Add the module to the project's dependencies and reinstall."),
        ),
        PatternRule::new(
            "rust_compile_error",
            r"error\[E\d{4}\]|could not compile `",
            "compilation_error",
            "Rust Compilation Failed",
            0.9,
        )?
        .describe("rustc rejected the crate.", Some("Fix the reported compiler errors.")),
        PatternRule::new(
            "typescript_compile_error",
            r"error TS\d{4}:",
            "compilation_error",
            "TypeScript Compilation Failed",
            0.9,
        )?
        .describe("tsc reported type errors.", Some("Fix the reported type errors.")),
        PatternRule::new(
            "docker_image_unavailable",
            r"manifest unknown|pull access denied|failed to solve with frontend",
            "infrastructure",
            "Docker Image Unavailable",
            0.8,
        )?
        .describe(
            "A container image could not be pulled or built.",
            Some("Check the image name, tag and registry credentials."),
        ),
        PatternRule::new(
            "network_failure",
            r"ECONNRESET|ETIMEDOUT|Could not resolve host|getaddrinfo ENOTFOUND",
            "network",
            "Network Connectivity Failure",
            0.75,
        )?
        .describe("A network request from the runner failed.", Some("Re-run the job; pin mirrors if it recurs.")),
        PatternRule::new(
            "authentication_failure",
            r"Bad credentials|Permission denied \(publickey\)|authentication failed|403 Forbidden",
            "permission",
            "Authentication Failed",
            0.85,
        )?
        .describe(
            "Credentials used by the workflow were rejected.",
            Some("Rotate the secret or grant the token the required permissions."),
        ),
        PatternRule::new(
            "lint_errors",
            r"\d+ problems? \(\d+ errors?",
            "lint_failure",
            "Lint Errors",
            0.8,
        )?
        .describe("The linter reported errors.", Some("Run the linter locally and fix the reported issues.")),
        PatternRule::new(
            "test_failures",
            r"Tests?:\s+\d+ failed|\d+ failing\b|test result: FAILED",
            "test_failure",
            "Test Suite Failed",
            0.8,
        )?
        .describe("One or more tests failed.", None),
        PatternRule::new(
            "nonzero_exit_code",
            r"exit code [1-9]\d*",
            GENERIC_FAILURE_CATEGORY,
            "Non-zero Exit Code",
            0.5,
        )?
        .describe("A step exited with a non-zero status and no more specific signature matched.", None),
    ])
}
