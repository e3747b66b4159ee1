//! Coverage summarizer invocation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{CovgateError, Result};

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SummarizerConfig {
    /// Executable to run.
    pub binary: String,

    /// Timeout in seconds (0 disables the timeout).
    #[serde(alias = "timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            binary: "gcovr".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// One summarizer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Project root the report paths are relative to.
    pub root: PathBuf,

    /// Regex restricting the report to one unit.
    pub filter: String,

    /// JSON summary file name, written inside `work_dir`.
    pub output_file: String,

    /// Scratch directory holding the staged artifacts.
    pub work_dir: PathBuf,
}

impl SummaryRequest {
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(&self.output_file)
    }
}

/// Result of a summarizer execution.
#[derive(Debug, Clone)]
pub struct SummarizerOutput {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl SummarizerOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Backend that produces a JSON coverage summary for staged artifacts.
#[async_trait]
pub trait CoverageSummarizer: Send + Sync {
    /// Run the summarizer and wait for it to exit.
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummarizerOutput>;
}

/// `gcovr` command-line summarizer.
#[derive(Debug, Clone, Default)]
pub struct GcovrSummarizer {
    config: SummarizerConfig,
}

impl GcovrSummarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the binary for `request`.
    pub fn command_args(&self, request: &SummaryRequest) -> Vec<String> {
        vec![
            "--root".to_string(),
            request.root.to_string_lossy().into_owned(),
            "--filter".to_string(),
            request.filter.clone(),
            "--json-summary".to_string(),
            request.output_file.clone(),
            request.work_dir.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl CoverageSummarizer for GcovrSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummarizerOutput> {
        let start = Instant::now();
        let args = self.command_args(request);
        debug!(binary = %self.config.binary, args = ?args, "Running coverage summarizer");

        let child = Command::new(&self.config.binary)
            .args(&args)
            .current_dir(&request.work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CovgateError::SummarizerSpawn {
                binary: self.config.binary.clone(),
                source,
            })?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| CovgateError::SummarizerTimeout {
                timeout_secs: self.config.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(SummarizerOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}
