//! covgate - coverage gate for merge request review
//!
//! Given the changed files of a merge request and an instrumented build
//! tree, covgate:
//! - Selects eligible C++ sources and maps test files back to their source
//! - Resolves each file's project root from build manifests
//! - Stages the file's `.gcda`/`.gcno` artifacts in an isolated workspace
//! - Runs the coverage summarizer and checks the result against policy
//! - Produces review comments for files below their minimum

pub mod classifier;
pub mod comments;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod locator;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use classifier::{classify, ChangeRecord, ClassifierSettings, EvaluationTarget};
pub use comments::{aggregate, comment_id, CommentBatch, ReviewComment};
pub use config::{CoverageConfig, MergeRequest, ReviewConfig, ReviewSettings};
pub use error::{CovgateError, Result};
pub use evaluator::{evaluate, parse_report, CoverageOutcome, CoverageResult, SummaryReport};
pub use gate::{resolve_minimum, CoveragePolicy, CoverageRule, MinimumCoverage, RuleGroup};
pub use locator::{locate_root, BuildSystem, ManifestTable, ProjectRoot, RootLocator};
pub use pipeline::{ReviewPipeline, ReviewReport, SkipReason, SkippedTarget};
pub use runner::{
    CoverageSummarizer, GcovrSummarizer, SummarizerConfig, SummarizerOutput, SummaryRequest,
};
pub use stage::stage;
pub use telemetry::init_tracing;
pub use workspace::ScratchWorkspace;
