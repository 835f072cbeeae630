use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::path_policy::{
    AllowRule, PathPolicy, DEFAULT_ALLOW_PREFIXES, DEFAULT_DENY_FILE_PATTERNS,
    DEFAULT_DENY_PREFIXES, DEFAULT_DENY_SEGMENTS, DEFAULT_LOCK_FILE_NAMES,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
/// Operator overrides for the path policy. Omitted lists keep their defaults.
pub struct PathPolicyFile {
    #[serde(default)]
    pub allow_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_files: Option<Vec<String>>,
    #[serde(default)]
    pub deny_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub deny_segments: Option<Vec<String>>,
    #[serde(default)]
    pub deny_file_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub lock_file_names: Option<Vec<String>>,
}

impl PathPolicyFile {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse path policy toml")
    }

    pub fn build_prefix_policy(&self) -> Result<PathPolicy> {
        let allow = self
            .allow_prefixes
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_ALLOW_PREFIXES));
        self.build(AllowRule::Prefixes(allow))
    }

    /// `fallback_files` applies when the file does not list `allowed_files`.
    pub fn build_exact_file_policy(&self, fallback_files: &[String]) -> Result<PathPolicy> {
        let files = self
            .allowed_files
            .clone()
            .unwrap_or_else(|| fallback_files.to_vec());
        self.build(AllowRule::ExactFiles(files))
    }

    fn build(&self, allow: AllowRule) -> Result<PathPolicy> {
        PathPolicy::new(
            allow,
            self.deny_prefixes
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_DENY_PREFIXES)),
            self.deny_segments
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_DENY_SEGMENTS)),
            self.deny_file_patterns
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_DENY_FILE_PATTERNS)),
            self.lock_file_names
                .clone()
                .unwrap_or_else(|| owned(DEFAULT_LOCK_FILE_NAMES)),
        )
    }
}

pub fn load_path_policy_file(path: &Path) -> Result<PathPolicyFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read path policy file {}", path.display()))?;
    PathPolicyFile::parse(&raw)
        .with_context(|| format!("invalid path policy file {}", path.display()))
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}
