use std::path::{Component, Path, PathBuf};

use patchbot_github::RepoRef;
use patchbot_safety::{load_path_policy_file, PathPolicy, PathPolicyFile};
use thiserror::Error;

use crate::cooldown_lock::{CooldownLock, DEFAULT_COOLDOWN_WINDOW_MS};
use crate::trigger_command::{parse_trigger_command, TriggerCommand};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_STATE_DIR: &str = ".ai";
pub const DEFAULT_READY_LABEL: &str = "ai-processed";
pub const DEFAULT_BLOCKED_LABEL: &str = "ai-blocked";
pub const DEFAULT_BRANCH_PREFIX: &str = "ai/issue-";
pub const DEFAULT_TARGET_FILE: &str = "web/index.html";
pub const DEFAULT_ALLOWED_FILES: &[&str] = &["index.html", "web/index.html"];
pub const DEFAULT_MAX_DIFF_BYTES: usize = 200_000;
pub const DEFAULT_EXCERPT_LINES: usize = 40;
pub const DEFAULT_LISTING_LIMIT: usize = 2_000;
pub const DEFAULT_GIT_AUTHOR_NAME: &str = "github-actions[bot]";
pub const DEFAULT_GIT_AUTHOR_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Shape of change the completion backend is asked to return.
pub enum ChangeVariant {
    /// JSON object listing full contents for allowlisted files.
    FileSet,
    /// Unified diff across allow-prefixed paths.
    Diff,
}

impl ChangeVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileSet => "file-set",
            Self::Diff => "diff",
        }
    }
}

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("missing required input {0}")]
    MissingInput(&'static str),
    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),
    #[error("invalid issue number '{0}'")]
    InvalidIssueNumber(String),
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
    #[error("state directory '{0}' must be a relative path inside the repository")]
    StateDirNotRelative(String),
    #[error("branch prefix '{0}' is not a valid branch name prefix")]
    InvalidBranchPrefix(String),
    #[error("invalid path policy: {0}")]
    PathPolicy(String),
}

#[derive(Debug, Clone)]
/// Raw, unvalidated inputs as collected from flags and environment.
pub struct RunConfigInputs {
    pub repo: Option<String>,
    pub issue_number: Option<String>,
    pub actor: Option<String>,
    pub comment_body: String,
    pub variant: ChangeVariant,
    pub model: String,
    pub repo_root: PathBuf,
    pub state_dir: PathBuf,
    pub cooldown_window_ms: u64,
    pub max_diff_bytes: usize,
    pub excerpt_lines: usize,
    pub listing_limit: usize,
    pub ready_label: String,
    pub blocked_label: String,
    pub branch_prefix: String,
    pub base_branch: Option<String>,
    pub target_file: String,
    pub allowed_files: Vec<String>,
    pub policy_file: Option<PathBuf>,
    pub commit_message: Option<String>,
    pub git_author_name: String,
    pub git_author_email: String,
}

impl Default for RunConfigInputs {
    fn default() -> Self {
        Self {
            repo: None,
            issue_number: None,
            actor: None,
            comment_body: String::new(),
            variant: ChangeVariant::FileSet,
            model: DEFAULT_MODEL.to_string(),
            repo_root: PathBuf::from("."),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            cooldown_window_ms: DEFAULT_COOLDOWN_WINDOW_MS,
            max_diff_bytes: DEFAULT_MAX_DIFF_BYTES,
            excerpt_lines: DEFAULT_EXCERPT_LINES,
            listing_limit: DEFAULT_LISTING_LIMIT,
            ready_label: DEFAULT_READY_LABEL.to_string(),
            blocked_label: DEFAULT_BLOCKED_LABEL.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            base_branch: None,
            target_file: DEFAULT_TARGET_FILE.to_string(),
            allowed_files: DEFAULT_ALLOWED_FILES
                .iter()
                .map(|path| (*path).to_string())
                .collect(),
            policy_file: None,
            commit_message: None,
            git_author_name: DEFAULT_GIT_AUTHOR_NAME.to_string(),
            git_author_email: DEFAULT_GIT_AUTHOR_EMAIL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
/// Validated settings for one pipeline invocation.
pub struct RunConfig {
    pub repo: RepoRef,
    pub issue_number: u64,
    pub actor: String,
    pub comment_body: String,
    pub variant: ChangeVariant,
    pub model: String,
    pub repo_root: PathBuf,
    pub state_dir: PathBuf,
    pub cooldown_window_ms: u64,
    pub max_diff_bytes: usize,
    pub excerpt_lines: usize,
    pub listing_limit: usize,
    pub ready_label: String,
    pub blocked_label: String,
    pub branch_prefix: String,
    pub base_branch: Option<String>,
    pub target_file: String,
    pub path_policy: PathPolicy,
    pub commit_message: Option<String>,
    pub git_author_name: String,
    pub git_author_email: String,
}

impl RunConfig {
    pub fn from_inputs(inputs: RunConfigInputs) -> Result<Self, RunConfigError> {
        let repo_raw = required(inputs.repo.as_deref(), "REPO")?;
        let repo = RepoRef::parse(repo_raw)
            .map_err(|_| RunConfigError::InvalidRepository(repo_raw.to_string()))?;
        let issue_raw = required(inputs.issue_number.as_deref(), "ISSUE_NUMBER")?;
        let issue_number = parse_issue_number(issue_raw)?;

        let actor = inputs
            .actor
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if parse_trigger_command(&inputs.comment_body) == TriggerCommand::DryRun
            && actor.is_empty()
        {
            return Err(RunConfigError::MissingInput("ACTOR"));
        }

        if inputs.cooldown_window_ms == 0 {
            return Err(RunConfigError::ZeroLimit("cooldown window"));
        }
        if inputs.max_diff_bytes == 0 {
            return Err(RunConfigError::ZeroLimit("max diff bytes"));
        }
        if inputs.excerpt_lines == 0 {
            return Err(RunConfigError::ZeroLimit("excerpt lines"));
        }
        if inputs.listing_limit == 0 {
            return Err(RunConfigError::ZeroLimit("listing limit"));
        }
        if !is_relative_inside(&inputs.state_dir) {
            return Err(RunConfigError::StateDirNotRelative(
                inputs.state_dir.display().to_string(),
            ));
        }
        let branch_prefix = inputs.branch_prefix.trim().to_string();
        if branch_prefix.is_empty()
            || branch_prefix.starts_with('/')
            || branch_prefix.contains("..")
            || branch_prefix.chars().any(char::is_whitespace)
        {
            return Err(RunConfigError::InvalidBranchPrefix(inputs.branch_prefix));
        }

        let path_policy = build_path_policy(
            inputs.variant,
            &inputs.allowed_files,
            inputs.policy_file.as_deref(),
        )?;

        Ok(Self {
            repo,
            issue_number,
            actor,
            comment_body: inputs.comment_body,
            variant: inputs.variant,
            model: non_empty_or(inputs.model, DEFAULT_MODEL),
            repo_root: inputs.repo_root,
            state_dir: inputs.state_dir,
            cooldown_window_ms: inputs.cooldown_window_ms,
            max_diff_bytes: inputs.max_diff_bytes,
            excerpt_lines: inputs.excerpt_lines,
            listing_limit: inputs.listing_limit,
            ready_label: non_empty_or(inputs.ready_label, DEFAULT_READY_LABEL),
            blocked_label: non_empty_or(inputs.blocked_label, DEFAULT_BLOCKED_LABEL),
            branch_prefix,
            base_branch: inputs
                .base_branch
                .map(|branch| branch.trim().to_string())
                .filter(|branch| !branch.is_empty()),
            target_file: non_empty_or(inputs.target_file, DEFAULT_TARGET_FILE),
            path_policy,
            commit_message: inputs
                .commit_message
                .map(|message| message.trim().to_string())
                .filter(|message| !message.is_empty()),
            git_author_name: non_empty_or(inputs.git_author_name, DEFAULT_GIT_AUTHOR_NAME),
            git_author_email: non_empty_or(inputs.git_author_email, DEFAULT_GIT_AUTHOR_EMAIL),
        })
    }

    pub fn trigger(&self) -> TriggerCommand {
        parse_trigger_command(&self.comment_body)
    }

    pub fn branch_name(&self) -> String {
        format!("{}{}", self.branch_prefix, self.issue_number)
    }

    /// State directory resolved against the repository root.
    pub fn state_dir_path(&self) -> PathBuf {
        self.repo_root.join(&self.state_dir)
    }

    pub fn cooldown_lock(&self) -> CooldownLock {
        CooldownLock::new(&self.state_dir_path(), self.cooldown_window_ms)
    }

    /// Repository-relative path of the dry-run marker file.
    pub fn dry_run_marker_path(&self) -> String {
        let state_dir = self
            .state_dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        let file_name = format!("DRY_RUN_ISSUE_{}.md", self.issue_number);
        if state_dir.is_empty() {
            file_name
        } else {
            format!("{state_dir}/{file_name}")
        }
    }

    pub fn apply_commit_message(&self) -> String {
        self.commit_message.clone().unwrap_or_else(|| {
            format!("chore(ai): apply AI change for issue #{}", self.issue_number)
        })
    }

    pub fn dry_run_commit_message(&self) -> String {
        format!("chore(ai): dry-run placeholder for issue #{}", self.issue_number)
    }
}

pub fn parse_issue_number(raw: &str) -> Result<u64, RunConfigError> {
    let trimmed = raw.trim().trim_start_matches('#');
    match trimmed.parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(RunConfigError::InvalidIssueNumber(raw.to_string())),
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, RunConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(RunConfigError::MissingInput(name))
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_relative_inside(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn build_path_policy(
    variant: ChangeVariant,
    allowed_files: &[String],
    policy_file: Option<&Path>,
) -> Result<PathPolicy, RunConfigError> {
    let file = match policy_file {
        Some(path) => load_path_policy_file(path)
            .map_err(|error| RunConfigError::PathPolicy(format!("{error:#}")))?,
        None => PathPolicyFile::default(),
    };
    let allowed_files = allowed_files
        .iter()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect::<Vec<_>>();
    let policy = match variant {
        ChangeVariant::FileSet => file.build_exact_file_policy(&allowed_files),
        ChangeVariant::Diff => file.build_prefix_policy(),
    };
    policy.map_err(|error| RunConfigError::PathPolicy(format!("{error:#}")))
}
