//! Changed-file eligibility and test-to-source mapping.

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CovgateError, Result};

/// Header extensions considered for evaluation (compared lowercase).
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hpp"];

/// Implementation extensions considered for evaluation (compared lowercase).
pub const SOURCE_EXTENSIONS: &[&str] = &["cpp"];

/// Extension of the production file a test is mapped back to.
const PRODUCTION_EXTENSION: &str = "cpp";

/// `[prefix_]<stem>test.cpp`, e.g. `tst_footest.cpp` or `FooTest.cpp`.
const TEST_FILE_PATTERN: &str = r"^(?:[^_]+_)?(.+?)test\.cpp$";

/// One entry of the merge request diff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
}

impl ChangeRecord {
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            new_path: path.into(),
            new_file: false,
            deleted_file: false,
        }
    }
}

/// A production source file selected for coverage evaluation.
///
/// Identity is `source_path`; the other fields are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EvaluationTarget {
    /// Path relative to the source tree, `/`-separated.
    pub source_path: String,
    /// Basename, e.g. `Foo.cpp`.
    pub class_name: String,
    /// Basename without extension, e.g. `Foo`.
    pub class_stem: String,
}

impl EvaluationTarget {
    pub fn new(source_path: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let class_name = source_path
            .rsplit('/')
            .next()
            .unwrap_or(source_path.as_str())
            .to_string();
        let class_stem = Path::new(&class_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| class_name.clone());
        Self {
            source_path,
            class_name,
            class_stem,
        }
    }

    /// Tree-relative path with the extension removed.
    pub fn path_without_extension(&self) -> &str {
        match self.source_path.rfind('.') {
            Some(idx) if idx > self.source_path.rfind('/').map_or(0, |s| s + 1) => {
                &self.source_path[..idx]
            }
            _ => &self.source_path,
        }
    }
}

/// Compiled classifier rules.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub only_new_files: bool,
    pub ignore: Vec<Regex>,
    pub test_marker: String,
    test_file: Regex,
}

impl ClassifierSettings {
    pub fn new(only_new_files: bool, ignore: &[String], test_marker: &str) -> Result<Self> {
        let ignore = ignore
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| CovgateError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let test_file = RegexBuilder::new(TEST_FILE_PATTERN)
            .case_insensitive(true)
            .build()
            .map_err(|source| CovgateError::InvalidRegex {
                pattern: TEST_FILE_PATTERN.to_string(),
                source,
            })?;
        Ok(Self {
            only_new_files,
            ignore,
            test_marker: test_marker.to_string(),
            test_file,
        })
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(path))
    }

    fn is_test(&self, path: &str) -> bool {
        path.contains(&self.test_marker)
    }

    /// Production stem captured from a test file basename.
    pub fn production_stem<'a>(&self, test_file_name: &'a str) -> Option<&'a str> {
        self.test_file
            .captures(test_file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Select the unique evaluation targets of a change set, in first-seen order.
pub fn classify(
    changes: &[ChangeRecord],
    settings: &ClassifierSettings,
    source_root: &Path,
) -> Vec<EvaluationTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for change in changes {
        if !is_eligible(change, settings) {
            continue;
        }

        let source_path = if settings.is_test(&change.new_path) {
            match source_for_test(source_root, &change.new_path, settings) {
                Some(path) => path,
                None => {
                    debug!(path = %change.new_path, "No production source found for test file");
                    continue;
                }
            }
        } else {
            change.new_path.clone()
        };

        if seen.insert(source_path.clone()) {
            targets.push(EvaluationTarget::new(source_path));
        }
    }

    targets
}

fn is_eligible(change: &ChangeRecord, settings: &ClassifierSettings) -> bool {
    if change.deleted_file {
        return false;
    }
    if settings.only_new_files && !change.new_file {
        return false;
    }
    if !has_source_extension(&change.new_path) {
        return false;
    }
    if settings.is_ignored(&change.new_path) {
        debug!(path = %change.new_path, "Ignored by regexToIgnore");
        return false;
    }
    true
}

/// Whether the path has a header or implementation extension (case-insensitive).
pub fn has_source_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| {
            HEADER_EXTENSIONS.contains(&ext.as_str()) || SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Map a test file to its production source by stem.
///
/// The tree is walked in file-name order; the first `<stem>.cpp` wins.
fn source_for_test(
    source_root: &Path,
    test_path: &str,
    settings: &ClassifierSettings,
) -> Option<String> {
    let file_name = test_path.rsplit('/').next()?;
    let stem = settings.production_stem(file_name)?;
    let wanted = format!("{stem}.{PRODUCTION_EXTENSION}");

    WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == wanted)
        .and_then(|entry| {
            entry
                .path()
                .strip_prefix(source_root)
                .ok()
                .map(tree_relative)
        })
}

/// Render a relative path with `/` separators.
pub(crate) fn tree_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
