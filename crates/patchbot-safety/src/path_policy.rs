use anyhow::{Context, Result};
use regex::{RegexSet, RegexSetBuilder};

pub const DEFAULT_ALLOW_PREFIXES: &[&str] = &[
    "src/",
    "app/",
    "api/app/",
    "web/",
    "docs/",
    "migrations/",
    "api/migrations/",
];
pub const DEFAULT_DENY_PREFIXES: &[&str] = &[".github/"];
pub const DEFAULT_DENY_SEGMENTS: &[&str] = &["secrets"];
pub const DEFAULT_DENY_FILE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "id_rsa*",
    ".npmrc",
    ".pypirc",
    "credentials*",
];
pub const DEFAULT_LOCK_FILE_NAMES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "uv.lock",
    "composer.lock",
    "Gemfile.lock",
    "go.sum",
];

const UNSAFE_REASON_CODES: &[&str] = &[
    "deny_empty_path",
    "deny_absolute_path",
    "deny_path_traversal",
    "deny_control_character",
];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Which paths may be written once the deny rules pass.
pub enum AllowRule {
    /// Any path under one of these directory prefixes.
    Prefixes(Vec<String>),
    /// Only these exact repository-relative paths.
    ExactFiles(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPolicyDecision {
    pub accepted: bool,
    pub reason_code: &'static str,
}

impl PathPolicyDecision {
    fn accept(reason_code: &'static str) -> Self {
        Self {
            accepted: true,
            reason_code,
        }
    }

    fn deny(reason_code: &'static str) -> Self {
        Self {
            accepted: false,
            reason_code,
        }
    }

    /// True when the path was refused for its shape rather than by a list.
    pub fn is_unsafe_path(&self) -> bool {
        !self.accepted && UNSAFE_REASON_CODES.contains(&self.reason_code)
    }
}

#[derive(Debug, Clone)]
/// Allow/deny classification applied to every path a change touches.
///
/// Deny rules always win over allow rules and a path matching no allow rule
/// is refused. Deny comparisons are ASCII case-insensitive; allow
/// comparisons are exact.
pub struct PathPolicy {
    allow: AllowRule,
    deny_prefixes: Vec<String>,
    deny_segments: Vec<String>,
    deny_file_patterns: Vec<String>,
    deny_file_matcher: RegexSet,
    lock_file_names: Vec<String>,
}

impl PathPolicy {
    pub fn new(
        allow: AllowRule,
        deny_prefixes: Vec<String>,
        deny_segments: Vec<String>,
        deny_file_patterns: Vec<String>,
        lock_file_names: Vec<String>,
    ) -> Result<Self> {
        let deny_file_matcher = compile_file_patterns(&deny_file_patterns)?;
        Ok(Self {
            allow,
            deny_prefixes: deny_prefixes
                .into_iter()
                .map(|prefix| prefix.to_ascii_lowercase())
                .collect(),
            deny_segments: deny_segments
                .into_iter()
                .map(|segment| segment.to_ascii_lowercase())
                .collect(),
            deny_file_patterns,
            deny_file_matcher,
            lock_file_names,
        })
    }

    /// Policy used when changes are free-form diffs across the source roots.
    pub fn default_for_prefixes() -> Result<Self> {
        Self::with_default_denies(AllowRule::Prefixes(to_owned_list(DEFAULT_ALLOW_PREFIXES)))
    }

    /// Policy used when changes may only rewrite the listed files.
    pub fn default_for_exact_files(files: &[String]) -> Result<Self> {
        Self::with_default_denies(AllowRule::ExactFiles(files.to_vec()))
    }

    fn with_default_denies(allow: AllowRule) -> Result<Self> {
        Self::new(
            allow,
            to_owned_list(DEFAULT_DENY_PREFIXES),
            to_owned_list(DEFAULT_DENY_SEGMENTS),
            to_owned_list(DEFAULT_DENY_FILE_PATTERNS),
            to_owned_list(DEFAULT_LOCK_FILE_NAMES),
        )
    }

    pub fn allow_rule(&self) -> &AllowRule {
        &self.allow
    }

    pub fn deny_prefixes(&self) -> &[String] {
        &self.deny_prefixes
    }

    pub fn deny_segments(&self) -> &[String] {
        &self.deny_segments
    }

    pub fn deny_file_patterns(&self) -> &[String] {
        &self.deny_file_patterns
    }

    pub fn lock_file_names(&self) -> &[String] {
        &self.lock_file_names
    }

    /// Classifies `path` without any issue text, so lock files are refused.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.evaluate(path, "").accepted
    }

    /// Classifies `path`; `issue_text` is searched for lock-file names that
    /// the issue explicitly asks to touch.
    pub fn evaluate(&self, path: &str, issue_text: &str) -> PathPolicyDecision {
        if path.trim().is_empty() {
            return PathPolicyDecision::deny("deny_empty_path");
        }
        if path.chars().any(char::is_control) {
            return PathPolicyDecision::deny("deny_control_character");
        }
        if is_absolute_path(path) {
            return PathPolicyDecision::deny("deny_absolute_path");
        }
        let segments = path.split(['/', '\\']).collect::<Vec<_>>();
        if segments.iter().any(|segment| *segment == "..") {
            return PathPolicyDecision::deny("deny_path_traversal");
        }

        let lowered = path.to_ascii_lowercase();
        if self
            .deny_prefixes
            .iter()
            .any(|prefix| lowered.starts_with(prefix.as_str()))
        {
            return PathPolicyDecision::deny("deny_protected_prefix");
        }
        if segments.iter().any(|segment| {
            let segment = segment.to_ascii_lowercase();
            self.deny_segments.contains(&segment)
        }) {
            return PathPolicyDecision::deny("deny_secrets_segment");
        }
        let file_name = segments.last().copied().unwrap_or_default();
        if self.deny_file_matcher.is_match(file_name) {
            return PathPolicyDecision::deny("deny_credential_file");
        }
        if self.is_lock_file(file_name) && !mentions_file_name(issue_text, file_name) {
            return PathPolicyDecision::deny("deny_lock_file_unreferenced");
        }

        match &self.allow {
            AllowRule::Prefixes(prefixes) => {
                if prefixes
                    .iter()
                    .any(|prefix| path.starts_with(prefix.as_str()))
                {
                    PathPolicyDecision::accept("allow_prefix")
                } else {
                    PathPolicyDecision::deny("deny_not_allowlisted")
                }
            }
            AllowRule::ExactFiles(files) => {
                if files.iter().any(|file| file == path) {
                    PathPolicyDecision::accept("allow_exact_file")
                } else {
                    PathPolicyDecision::deny("deny_not_allowlisted")
                }
            }
        }
    }

    fn is_lock_file(&self, file_name: &str) -> bool {
        self.lock_file_names
            .iter()
            .any(|lock| lock.eq_ignore_ascii_case(file_name))
    }
}

fn to_owned_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn is_absolute_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn mentions_file_name(issue_text: &str, file_name: &str) -> bool {
    !file_name.is_empty()
        && issue_text
            .to_ascii_lowercase()
            .contains(&file_name.to_ascii_lowercase())
}

fn compile_file_patterns(patterns: &[String]) -> Result<RegexSet> {
    let expressions = patterns
        .iter()
        .map(|pattern| {
            let escaped = regex::escape(pattern.trim()).replace(r"\*", ".*");
            format!("^{escaped}$")
        })
        .collect::<Vec<_>>();
    RegexSetBuilder::new(&expressions)
        .case_insensitive(true)
        .build()
        .context("failed to compile deny file patterns")
}
