//! Instrumentation artifact staging.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::classifier::EvaluationTarget;
use crate::error::Result;

/// Coverage counters written by instrumented binaries.
pub const COUNTERS_EXTENSION: &str = "gcda";

/// Coverage notes written by the compiler.
pub const NOTES_EXTENSION: &str = "gcno";

/// File names of the two artifacts belonging to `stem`.
pub fn artifact_names(stem: &str) -> [String; 2] {
    [
        format!("{stem}.{COUNTERS_EXTENSION}"),
        format!("{stem}.{NOTES_EXTENSION}"),
    ]
}

/// Find every artifact for `stem` under `search_dirs`, in sorted walk order.
pub fn find_artifacts(search_dirs: &[PathBuf], stem: &str) -> Vec<PathBuf> {
    let names = artifact_names(stem);
    let mut found = Vec::new();
    for dir in search_dirs {
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if names.iter().any(|n| *n == name) {
                found.push(entry.into_path());
            }
        }
    }
    found
}

/// Copy the target's artifacts into `scratch`.
///
/// Returns the staged paths; an empty result means the file was never
/// instrumented and cannot be evaluated. When several search directories
/// hold an artifact of the same name, the first one in search order is
/// staged and the rest are skipped. The caller is responsible for purging
/// `scratch` beforehand.
pub fn stage(
    search_dirs: &[PathBuf],
    target: &EvaluationTarget,
    scratch: &Path,
) -> Result<Vec<PathBuf>> {
    let mut staged = Vec::new();
    for artifact in find_artifacts(search_dirs, &target.class_stem) {
        let Some(name) = artifact.file_name() else {
            continue;
        };
        let dest = scratch.join(name);
        if staged.contains(&dest) {
            warn!(
                event = "stage.duplicate_artifact",
                file = %target.source_path,
                skipped = %artifact.display(),
                "Artifact already staged from an earlier search directory"
            );
            continue;
        }
        std::fs::copy(&artifact, &dest)?;
        debug!(from = %artifact.display(), to = %dest.display(), "Staged artifact");
        staged.push(dest);
    }
    Ok(staged)
}
