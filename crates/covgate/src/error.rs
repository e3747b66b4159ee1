//! Error taxonomy for the coverage gate.

use std::path::PathBuf;

/// Errors produced while evaluating a merge request.
///
/// Only [`CovgateError::Workspace`] and configuration errors abort a run; the
/// rest are converted into a per-file review comment by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CovgateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("scratch workspace {path} unavailable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch coverage summarizer {binary}: {source}")]
    SummarizerSpawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("coverage summarizer timed out after {timeout_secs} seconds")]
    SummarizerTimeout { timeout_secs: u64 },

    #[error("coverage summarizer exited with code {exit_code}: {stderr}")]
    SummarizerFailed { exit_code: i32, stderr: String },

    #[error("coverage report {path} could not be parsed: {source}")]
    ReportParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for coverage gate operations.
pub type Result<T> = std::result::Result<T, CovgateError>;
