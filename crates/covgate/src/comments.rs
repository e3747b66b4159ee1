//! Review comment rendering and aggregation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CovgateError;
use crate::evaluator::CoverageOutcome;

/// Template placeholder for the required minimum.
pub const PLACEHOLDER_MINIMUM: &str = "${PERCENT_MINIMUM_COVERAGE}";

/// Template placeholder for the measured coverage.
pub const PLACEHOLDER_COVERAGE: &str = "${PERCENT_COVERAGE}";

/// Appended when the global minimum was applied.
pub const FALLBACK_WARNING: &str = concat!(
    "<br>Warning: no project-specific coverage rule matches this file, ",
    "the global minimum was applied."
);

pub const ROOT_NOT_FOUND_MESSAGE: &str = "project root directory was not found";

const TOOL_FAILURE_PREFIX: &str = "coverage could not be computed: ";

const GROUP_ENTRY_SEPARATOR: &str = "<br><br>";

/// Comment record handed to the review host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewComment {
    pub comment_id: String,
    /// `None` for a grouped comment spanning several files.
    pub comment_path: Option<String>,
    pub comment_description: String,
    pub comment_snipset: bool,
    pub comment_start_line: u32,
    pub comment_end_line: u32,
    pub comment_language: String,
}

impl ReviewComment {
    pub fn new(path: Option<String>, description: String) -> Self {
        Self {
            comment_id: comment_id(&description),
            comment_path: path,
            comment_description: description,
            comment_snipset: true,
            comment_start_line: 1,
            comment_end_line: 1,
            comment_language: "c++".to_string(),
        }
    }
}

/// Stable comment id: hex SHA-256 of the body.
pub fn comment_id(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Body for a file below its minimum.
pub fn render_failure_message(template: &str, outcome: &CoverageOutcome) -> String {
    let mut body = template
        .replace(PLACEHOLDER_MINIMUM, &outcome.minimum_required.to_string())
        .replace(PLACEHOLDER_COVERAGE, &outcome.percent.to_string());
    if outcome.used_fallback {
        body.push_str(FALLBACK_WARNING);
    }
    body
}

/// Body for a file whose coverage could not be computed.
///
/// Built only from facts that repeat between runs. Summarizer stderr and
/// scratch paths change every run and would change the comment id, so they
/// are left to the log.
pub fn tool_failure_message(error: &CovgateError) -> String {
    let reason = match error {
        CovgateError::SummarizerFailed { exit_code, .. } => {
            format!("coverage summarizer exited with code {exit_code}")
        }
        CovgateError::SummarizerTimeout { timeout_secs } => {
            format!("coverage summarizer timed out after {timeout_secs} seconds")
        }
        CovgateError::SummarizerSpawn { binary, .. } => {
            format!("failed to launch coverage summarizer {binary}")
        }
        CovgateError::ReportParse { .. } => "coverage report could not be parsed".to_string(),
        CovgateError::Io(_) => "coverage artifacts could not be read".to_string(),
        _ => "internal error".to_string(),
    };
    format!("{TOOL_FAILURE_PREFIX}{reason}")
}

/// Per-path messages collected during a run, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CommentBatch {
    entries: Vec<(String, String)>,
    paths: HashSet<String>,
}

impl CommentBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message. Returns `false` if `path` already has one.
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) -> bool {
        let path = path.into();
        if !self.paths.insert(path.clone()) {
            return false;
        }
        self.entries.push((path, message.into()));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One comment per path, or a single path-less comment when `grouped`.
    pub fn into_comments(self, grouped: bool) -> Vec<ReviewComment> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        if grouped {
            let body = self
                .entries
                .iter()
                .map(|(path, message)| format!("{path}<br>{message}"))
                .collect::<Vec<_>>()
                .join(GROUP_ENTRY_SEPARATOR);
            return vec![ReviewComment::new(None, body)];
        }
        self.entries
            .into_iter()
            .map(|(path, message)| ReviewComment::new(Some(path), message))
            .collect()
    }
}

/// Aggregate `(path, message)` pairs, keeping the first message per path.
pub fn aggregate<I, P, M>(entries: I, grouped: bool) -> Vec<ReviewComment>
where
    I: IntoIterator<Item = (P, M)>,
    P: Into<String>,
    M: Into<String>,
{
    let mut batch = CommentBatch::new();
    for (path, message) in entries {
        batch.push(path, message);
    }
    batch.into_comments(grouped)
}
