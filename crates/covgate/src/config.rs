//! Review input configuration.
//!
//! The on-disk shape mirrors what the review host hands to every check:
//! the checked-out source tree, the comment template, the check-specific
//! `configs` block and the merge request payload. [`ReviewConfig::compile`]
//! validates it and pre-compiles every regex into [`ReviewSettings`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::classifier::{ChangeRecord, ClassifierSettings};
use crate::error::{CovgateError, Result};
use crate::gate::{CoveragePolicy, RuleGroup};
use crate::locator::ManifestTable;
use crate::runner::SummarizerConfig;

/// Default path-substring marking test sources.
pub const DEFAULT_TEST_MARKER: &str = "/test/";

/// Complete input for one review run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Root of the checked-out source tree.
    pub path_source: PathBuf,

    /// Comment template with `${PERCENT_MINIMUM_COVERAGE}` and `${PERCENT_COVERAGE}`.
    pub message: String,

    #[serde(default)]
    pub configs: CoverageConfig,

    pub merge: MergeRequest,
}

/// Check-specific configuration block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverageConfig {
    #[serde(alias = "minimum_coverage")]
    pub minimum_coverage: f64,

    #[serde(alias = "minimum_coverage_by_project")]
    pub minimum_coverage_by_project: Vec<RuleGroup>,

    /// `qmake` or `cmake`. Anything else makes every root lookup fail.
    #[serde(alias = "build_system")]
    pub build_system: String,

    #[serde(alias = "identify_test_class")]
    pub identify_test_class: String,

    #[serde(alias = "only_new_files")]
    pub only_new_files: bool,

    #[serde(alias = "regex_to_ignore")]
    pub regex_to_ignore: Vec<String>,

    #[serde(alias = "group_message")]
    pub group_message: bool,

    /// Tree-relative directories searched for artifacts after the project root.
    #[serde(alias = "build_directories")]
    pub build_directories: Vec<PathBuf>,

    /// Base directory for the scratch workspace (system temp dir when unset).
    #[serde(alias = "scratch_dir")]
    pub scratch_dir: Option<PathBuf>,

    pub summarizer: SummarizerConfig,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            minimum_coverage: 0.0,
            minimum_coverage_by_project: Vec::new(),
            build_system: "cmake".to_string(),
            identify_test_class: DEFAULT_TEST_MARKER.to_string(),
            only_new_files: false,
            regex_to_ignore: Vec::new(),
            group_message: false,
            build_directories: Vec::new(),
            scratch_dir: None,
            summarizer: SummarizerConfig::default(),
        }
    }
}

/// Merge request payload supplied by the review host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(deserialize_with = "id_as_string")]
    pub merge_request_id: String,

    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(u64),
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(s) => s,
        IdRepr::Number(n) => n.to_string(),
    })
}

/// Validated, pre-compiled settings consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub source_root: PathBuf,
    pub message_template: String,
    pub classifier: ClassifierSettings,
    pub policy: CoveragePolicy,
    pub build_system: String,
    pub manifests: ManifestTable,
    pub build_directories: Vec<PathBuf>,
    pub group_message: bool,
    pub scratch_base: PathBuf,
    pub summarizer: SummarizerConfig,
}

impl ReviewConfig {
    /// Load a config from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the config and compile it into [`ReviewSettings`].
    pub fn compile(&self) -> Result<ReviewSettings> {
        if self.path_source.as_os_str().is_empty() {
            return Err(CovgateError::Config("path_source must not be empty".to_string()));
        }
        let configs = &self.configs;
        check_percent("minimumCoverage", configs.minimum_coverage)?;
        for group in &configs.minimum_coverage_by_project {
            for rule in &group.regexs {
                check_percent(&format!("minimum for {:?}", rule.regex), rule.minimum)?;
            }
        }
        if configs.identify_test_class.is_empty() {
            return Err(CovgateError::Config(
                "identifyTestClass must not be empty".to_string(),
            ));
        }

        let classifier = ClassifierSettings::new(
            configs.only_new_files,
            &configs.regex_to_ignore,
            &configs.identify_test_class,
        )?;
        let policy = CoveragePolicy::compile(
            configs.minimum_coverage,
            &configs.minimum_coverage_by_project,
        )?;

        Ok(ReviewSettings {
            source_root: self.path_source.clone(),
            message_template: self.message.clone(),
            classifier,
            policy,
            build_system: configs.build_system.clone(),
            manifests: ManifestTable::default(),
            build_directories: configs.build_directories.clone(),
            group_message: configs.group_message,
            scratch_base: configs
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            summarizer: configs.summarizer.clone(),
        })
    }
}

fn check_percent(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(CovgateError::Config(format!(
            "{name} must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}
