//! Minimum-coverage policy resolution.
//!
//! Rule groups are evaluated in configured order and rules within a group
//! in order; the first rule whose regex matches the start of the path
//! decides. There is no specificity ranking. When nothing matches, the
//! global minimum applies and the result is flagged as a fallback.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CovgateError, Result};

/// Path regex with its required minimum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageRule {
    pub regex: String,
    #[serde(alias = "minimum_percent")]
    pub minimum: f64,
}

/// One project's ordered overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleGroup {
    #[serde(default)]
    pub regexs: Vec<CoverageRule>,
}

/// Resolved threshold for a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimumCoverage {
    pub minimum: f64,
    /// True when no project rule matched and the global minimum was used.
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Regex,
    minimum: f64,
}

/// Pre-compiled rule groups plus the global minimum.
#[derive(Debug, Clone)]
pub struct CoveragePolicy {
    global_minimum: f64,
    groups: Vec<Vec<CompiledRule>>,
}

impl CoveragePolicy {
    /// Compile every rule, anchoring it at the start of the path.
    pub fn compile(global_minimum: f64, groups: &[RuleGroup]) -> Result<Self> {
        let groups = groups
            .iter()
            .map(|group| {
                group
                    .regexs
                    .iter()
                    .map(|rule| {
                        Regex::new(&format!("^(?:{})", rule.regex))
                            .map(|pattern| CompiledRule {
                                pattern,
                                minimum: rule.minimum,
                            })
                            .map_err(|source| CovgateError::InvalidRegex {
                                pattern: rule.regex.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            global_minimum,
            groups,
        })
    }

    pub fn global_minimum(&self) -> f64 {
        self.global_minimum
    }

    /// Minimum that applies to `file_path`.
    pub fn resolve(&self, file_path: &str) -> MinimumCoverage {
        self.groups
            .iter()
            .flatten()
            .find(|rule| rule.pattern.is_match(file_path))
            .map(|rule| MinimumCoverage {
                minimum: rule.minimum,
                used_fallback: false,
            })
            .unwrap_or(MinimumCoverage {
                minimum: self.global_minimum,
                used_fallback: true,
            })
    }
}

/// Resolve the minimum for `file_path` without keeping a compiled policy.
pub fn resolve_minimum(
    file_path: &str,
    global_minimum: f64,
    rule_groups: &[RuleGroup],
) -> Result<MinimumCoverage> {
    Ok(CoveragePolicy::compile(global_minimum, rule_groups)?.resolve(file_path))
}
