//! Coverage review orchestration.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{classify, ChangeRecord, EvaluationTarget};
use crate::comments::{
    render_failure_message, tool_failure_message, CommentBatch, ReviewComment,
    ROOT_NOT_FOUND_MESSAGE,
};
use crate::config::ReviewSettings;
use crate::error::Result;
use crate::evaluator::{evaluate, CoverageOutcome};
use crate::locator::RootLocator;
use crate::runner::CoverageSummarizer;
use crate::stage::stage;
use crate::workspace::ScratchWorkspace;

/// Why a target produced neither an outcome nor a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No counters/notes found; the file was never instrumented.
    NoArtifacts,

    /// The summarizer analyzed zero lines for the filter.
    NothingAnalyzed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTarget {
    pub source_path: String,
    pub reason: SkipReason,
}

/// Result of a complete review run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub run_id: String,

    /// Comments to post, per file or grouped.
    pub comments: Vec<ReviewComment>,

    /// Every target that was measured, passing or not.
    pub outcomes: Vec<CoverageOutcome>,

    pub skipped: Vec<SkippedTarget>,

    pub duration_ms: u64,
}

impl ReviewReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }
}

/// Coverage review orchestrator.
pub struct ReviewPipeline;

impl ReviewPipeline {
    /// Evaluate every eligible change and collect review comments.
    ///
    /// Targets are processed one at a time. A per-file failure becomes a
    /// comment or a silent skip; only an unusable scratch workspace aborts
    /// the run.
    pub async fn run(
        settings: &ReviewSettings,
        merge_request_id: &str,
        changes: &[ChangeRecord],
        summarizer: &dyn CoverageSummarizer,
    ) -> Result<ReviewReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "covgate.review",
            run_id = %run_id,
            merge_request_id = %merge_request_id
        );
        Self::run_inner(settings, merge_request_id, changes, summarizer, run_id)
            .instrument(span)
            .await
    }

    async fn run_inner(
        settings: &ReviewSettings,
        merge_request_id: &str,
        changes: &[ChangeRecord],
        summarizer: &dyn CoverageSummarizer,
        run_id: Uuid,
    ) -> Result<ReviewReport> {
        let start = Instant::now();
        let workspace =
            ScratchWorkspace::create(&settings.scratch_base, merge_request_id, &run_id)?;

        let targets = classify(changes, &settings.classifier, &settings.source_root);
        info!(
            event = "review.started",
            changes = changes.len(),
            targets = targets.len(),
            "Starting coverage review"
        );

        let mut locator = RootLocator::new(
            &settings.manifests,
            &settings.build_system,
            &settings.source_root,
        );
        let mut batch = CommentBatch::new();
        let mut outcomes = Vec::new();
        let mut skipped = Vec::new();

        for target in targets {
            workspace.purge()?;

            let Some(root) = locator.locate(&target) else {
                warn!(event = "target.root_not_found", file = %target.source_path);
                batch.push(target.source_path.clone(), ROOT_NOT_FOUND_MESSAGE);
                continue;
            };

            let search_dirs = artifact_search_dirs(settings, &root.directory);
            let staged = match stage(&search_dirs, &target, workspace.path()) {
                Ok(staged) => staged,
                Err(e) => {
                    warn!(
                        event = "target.stage_failed",
                        file = %target.source_path,
                        error = %e
                    );
                    batch.push(target.source_path.clone(), tool_failure_message(&e));
                    continue;
                }
            };
            if staged.is_empty() {
                debug!(
                    event = "target.skipped",
                    file = %target.source_path,
                    reason = "no_artifacts"
                );
                skipped.push(skip(&target, SkipReason::NoArtifacts));
                continue;
            }

            let result = match evaluate(
                summarizer,
                &root,
                &target,
                &settings.source_root,
                workspace.path(),
            )
            .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        event = "target.summarizer_failed",
                        file = %target.source_path,
                        error = %e
                    );
                    batch.push(target.source_path.clone(), tool_failure_message(&e));
                    continue;
                }
            };
            if result.is_degenerate() {
                debug!(
                    event = "target.skipped",
                    file = %target.source_path,
                    reason = "nothing_analyzed"
                );
                skipped.push(skip(&target, SkipReason::NothingAnalyzed));
                continue;
            }

            let minimum = settings.policy.resolve(&target.source_path);
            let outcome = CoverageOutcome {
                target,
                percent: result.percent,
                total_lines: result.total_lines,
                minimum_required: minimum.minimum,
                used_fallback: minimum.used_fallback,
            };
            info!(
                event = "target.evaluated",
                file = %outcome.target.source_path,
                percent = outcome.percent,
                minimum = outcome.minimum_required,
                fallback = outcome.used_fallback,
                passed = outcome.passed(),
            );
            if !outcome.passed() {
                batch.push(
                    outcome.target.source_path.clone(),
                    render_failure_message(&settings.message_template, &outcome),
                );
            }
            outcomes.push(outcome);
        }

        drop(workspace);

        let comments = batch.into_comments(settings.group_message);
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            event = "review.finished",
            comments = comments.len(),
            evaluated = outcomes.len(),
            skipped = skipped.len(),
            duration_ms = duration_ms,
        );

        Ok(ReviewReport {
            run_id: run_id.to_string(),
            comments,
            outcomes,
            skipped,
            duration_ms,
        })
    }
}

/// The project root first, then configured build directories.
fn artifact_search_dirs(settings: &ReviewSettings, root: &std::path::Path) -> Vec<PathBuf> {
    std::iter::once(root.to_path_buf())
        .chain(
            settings
                .build_directories
                .iter()
                .map(|dir| settings.source_root.join(dir)),
        )
        .collect()
}

fn skip(target: &EvaluationTarget, reason: SkipReason) -> SkippedTarget {
    SkippedTarget {
        source_path: target.source_path.clone(),
        reason,
    }
}
