//! Project root discovery through build manifests.
//!
//! A file's project root is the deepest ancestor directory holding a build
//! manifest whose text references the file's basename. Build systems offer no
//! cheap "which target owns this file" query at review time, so the manifest
//! text is scanned instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::EvaluationTarget;
use crate::error::{CovgateError, Result};

/// Supported build systems.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    /// Any `*.pro` project file.
    Qmake,

    /// `CMakeLists.txt`
    Cmake,
}

impl BuildSystem {
    /// Parse the configured build system name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "qmake" => Some(BuildSystem::Qmake),
            "cmake" => Some(BuildSystem::Cmake),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildSystem::Qmake => "qmake",
            BuildSystem::Cmake => "cmake",
        }
    }

    /// Manifest file-name pattern.
    pub fn manifest_pattern(&self) -> &'static str {
        match self {
            BuildSystem::Qmake => "*.pro",
            BuildSystem::Cmake => "CMakeLists.txt",
        }
    }
}

/// Immutable build system → manifest pattern table.
#[derive(Debug, Clone)]
pub struct ManifestTable {
    entries: Vec<(BuildSystem, Pattern)>,
}

impl ManifestTable {
    /// Build a table from explicit patterns.
    pub fn new(entries: &[(BuildSystem, &str)]) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|(system, pattern)| {
                Pattern::new(pattern)
                    .map(|p| (*system, p))
                    .map_err(|e| {
                        CovgateError::Config(format!(
                            "invalid manifest pattern {pattern:?} for {}: {e}",
                            system.name()
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Manifest pattern for a configured build system name.
    pub fn pattern_for(&self, build_system: &str) -> Option<&Pattern> {
        let system = BuildSystem::parse(build_system)?;
        self.entries
            .iter()
            .find(|(s, _)| *s == system)
            .map(|(_, p)| p)
    }
}

impl Default for ManifestTable {
    fn default() -> Self {
        let entries = [BuildSystem::Qmake, BuildSystem::Cmake]
            .into_iter()
            .filter_map(|s| Pattern::new(s.manifest_pattern()).ok().map(|p| (s, p)))
            .collect();
        Self { entries }
    }
}

/// Directory whose build manifest references an evaluation target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRoot {
    pub directory: PathBuf,
}

/// Find the deepest ancestor of `target` whose manifest references it.
///
/// Candidates run from the file's own directory up to `source_root`
/// inclusive. Returns `None` for an unknown build system.
pub fn locate_root(
    manifests: &ManifestTable,
    build_system: &str,
    source_root: &Path,
    target: &EvaluationTarget,
) -> Option<ProjectRoot> {
    let Some(pattern) = manifests.pattern_for(build_system) else {
        warn!(
            event = "config.unknown_build_system",
            build_system = %build_system,
            "Unrecognized build system, no project root can be resolved"
        );
        return None;
    };

    let segments: Vec<&str> = target
        .source_path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let dirs = &segments[..segments.len().saturating_sub(1)];

    for depth in (0..=dirs.len()).rev() {
        let candidate = dirs[..depth]
            .iter()
            .fold(source_root.to_path_buf(), |acc, seg| acc.join(seg));
        if manifest_references(&candidate, pattern, &target.class_name) {
            debug!(
                root = %candidate.display(),
                file = %target.source_path,
                "Resolved project root"
            );
            return Some(ProjectRoot {
                directory: candidate,
            });
        }
    }

    None
}

fn manifest_references(dir: &Path, pattern: &Pattern, class_name: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };

    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter(|e| pattern.matches(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    manifests.sort();

    manifests.iter().any(|manifest| match std::fs::read_to_string(manifest) {
        Ok(content) => references_file(&content, class_name),
        Err(e) => {
            debug!(manifest = %manifest.display(), error = %e, "Unreadable manifest");
            false
        }
    })
}

/// Whether `content` mentions `class_name` right after a path separator or whitespace.
pub fn references_file(content: &str, class_name: &str) -> bool {
    if class_name.is_empty() {
        return false;
    }
    content.match_indices(class_name).any(|(idx, _)| {
        content[..idx]
            .chars()
            .next_back()
            .is_some_and(|c| c == '/' || c == '\\' || c.is_whitespace())
    })
}

/// Root lookups memoized by `(directory, class name)` for one run.
#[derive(Debug)]
pub struct RootLocator<'a> {
    manifests: &'a ManifestTable,
    build_system: &'a str,
    source_root: &'a Path,
    cache: HashMap<(String, String), Option<ProjectRoot>>,
}

impl<'a> RootLocator<'a> {
    pub fn new(manifests: &'a ManifestTable, build_system: &'a str, source_root: &'a Path) -> Self {
        Self {
            manifests,
            build_system,
            source_root,
            cache: HashMap::new(),
        }
    }

    pub fn locate(&mut self, target: &EvaluationTarget) -> Option<ProjectRoot> {
        let dir = target
            .source_path
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir)
            .to_string();
        let key = (dir, target.class_name.clone());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let root = locate_root(self.manifests, self.build_system, self.source_root, target);
        self.cache.insert(key, root.clone());
        root
    }
}
