//! Run-scoped scratch workspace.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CovgateError, Result};

/// Scratch directory owned by one review run.
///
/// The summarizer aggregates every counters/notes pair in its working
/// directory, so [`ScratchWorkspace::purge`] must run before each target is
/// staged. The directory is removed when the workspace is dropped.
#[derive(Debug)]
pub struct ScratchWorkspace {
    path: PathBuf,
}

impl ScratchWorkspace {
    /// Create `<base>/covgate-<merge_request_id>-<run_id>`.
    pub fn create(base: &Path, merge_request_id: &str, run_id: &Uuid) -> Result<Self> {
        let path = base.join(format!(
            "covgate-{}-{}",
            sanitize(merge_request_id),
            run_id.simple()
        ));
        std::fs::create_dir_all(&path).map_err(|source| CovgateError::Workspace {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Created scratch workspace");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove every regular file left in the workspace. Returns the count.
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.path).map_err(|source| self.error(source))? {
            let entry = entry.map_err(|source| self.error(source))?;
            if entry.file_type().map_err(|source| self.error(source))?.is_file() {
                std::fs::remove_file(entry.path()).map_err(|source| self.error(source))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Sorted names of the files currently in the workspace.
    pub fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.path).map_err(|source| self.error(source))? {
            let entry = entry.map_err(|source| self.error(source))?;
            if entry.file_type().map_err(|source| self.error(source))?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn error(&self, source: std::io::Error) -> CovgateError {
        CovgateError::Workspace {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch workspace"
            ),
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
