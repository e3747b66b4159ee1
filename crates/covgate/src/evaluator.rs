//! Per-target coverage measurement through the summarizer.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{tree_relative, EvaluationTarget};
use crate::error::{CovgateError, Result};
use crate::locator::ProjectRoot;
use crate::runner::{CoverageSummarizer, SummaryRequest};

/// Subset of the summarizer's JSON summary that the gate consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummaryReport {
    #[serde(default)]
    pub files: Vec<FileSummary>,
    #[serde(default)]
    pub line_total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSummary {
    pub filename: String,
    #[serde(default)]
    pub line_percent: Option<f64>,
}

impl SummaryReport {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Line percentage of the first entry named `class_name`, 0 when absent.
    ///
    /// Matching is by basename only, so two same-named files in one report
    /// resolve to whichever comes first.
    pub fn line_percent_for(&self, class_name: &str) -> f64 {
        let suffix = format!("/{class_name}");
        self.files
            .iter()
            .find(|f| f.filename == class_name || f.filename.ends_with(&suffix))
            .and_then(|f| f.line_percent)
            .unwrap_or(0.0)
    }
}

/// Measured coverage of one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub percent: f64,
    pub total_lines: u64,
}

impl CoverageResult {
    /// A zero line total means the filter matched nothing, not zero coverage.
    pub fn is_degenerate(&self) -> bool {
        self.total_lines == 0
    }
}

/// Final verdict for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageOutcome {
    pub target: EvaluationTarget,
    pub percent: f64,
    pub total_lines: u64,
    pub minimum_required: f64,
    pub used_fallback: bool,
}

impl CoverageOutcome {
    pub fn passed(&self) -> bool {
        self.percent >= self.minimum_required
    }
}

/// Filter restricting the report to `target`, relative to `root`.
pub fn coverage_filter(
    root: &ProjectRoot,
    source_root: &Path,
    target: &EvaluationTarget,
) -> String {
    let full = source_root.join(target.path_without_extension());
    let relative = full
        .strip_prefix(&root.directory)
        .map(tree_relative)
        .unwrap_or_else(|_| target.path_without_extension().to_string());
    format!(".*{}.*", regex::escape(&relative))
}

/// Parse a JSON summary for `class_name`.
pub fn parse_report(text: &str, class_name: &str) -> serde_json::Result<CoverageResult> {
    let report = SummaryReport::from_json(text)?;
    Ok(CoverageResult {
        percent: report.line_percent_for(class_name),
        total_lines: report.line_total,
    })
}

/// Run the summarizer over the staged artifacts and read back the target's coverage.
pub async fn evaluate(
    summarizer: &dyn CoverageSummarizer,
    root: &ProjectRoot,
    target: &EvaluationTarget,
    source_root: &Path,
    scratch: &Path,
) -> Result<CoverageResult> {
    let request = SummaryRequest {
        root: root.directory.clone(),
        filter: coverage_filter(root, source_root, target),
        output_file: format!("{}.json", target.class_stem),
        work_dir: scratch.to_path_buf(),
    };

    let output = summarizer.summarize(&request).await?;
    if !output.passed() {
        return Err(CovgateError::SummarizerFailed {
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    let path = request.output_path();
    let text = std::fs::read_to_string(&path)?;
    let result = parse_report(&text, &target.class_name)
        .map_err(|source| CovgateError::ReportParse { path, source })?;
    debug!(
        file = %target.source_path,
        percent = result.percent,
        total_lines = result.total_lines,
        duration_ms = output.duration_ms,
        "Parsed coverage summary"
    );
    Ok(result)
}
