use std::path::PathBuf;

use clap::Parser;
use patchbot_pipeline::RunConfigInputs;

use crate::cli_types::CliChangeVariant;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "patchbot",
    about = "Turns `/ai` issue comments into draft pull requests and AI-generated commits",
    version
)]
pub struct Cli {
    #[arg(long, env = "REPO", help = "Repository in owner/repo form.")]
    pub repo: Option<String>,

    #[arg(
        long = "issue-number",
        env = "ISSUE_NUMBER",
        help = "Issue the triggering comment was posted on."
    )]
    pub issue_number: Option<String>,

    #[arg(
        long = "comment-body",
        env = "COMMENT_BODY",
        default_value = "",
        help = "Raw text of the triggering comment."
    )]
    pub comment_body: String,

    #[arg(long, env = "ACTOR", help = "Login of the commenter; required for /ai.")]
    pub actor: Option<String>,

    #[arg(
        long = "variant",
        env = "AI_CHANGE_VARIANT",
        value_enum,
        default_value = "file-set",
        help = "Change shape requested from the model: full file contents or a unified diff."
    )]
    pub variant: CliChangeVariant,

    #[arg(
        long = "ai-api-key",
        env = "AI_API_KEY",
        hide_env_values = true,
        help = "API key for the completion backend; required for /ai apply."
    )]
    pub ai_api_key: Option<String>,

    #[arg(long = "ai-model", env = "AI_MODEL", default_value = "gpt-4.1-mini")]
    pub ai_model: String,

    #[arg(
        long = "ai-api-base",
        env = "AI_API_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub ai_api_base: String,

    #[arg(long = "ai-organization", env = "AI_ORGANIZATION")]
    pub ai_organization: Option<String>,

    #[arg(
        long = "ai-request-timeout-ms",
        env = "AI_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64
    )]
    pub ai_request_timeout_ms: u64,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token; falls back to GH_TOKEN."
    )]
    pub github_token: Option<String>,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-request-timeout-ms",
        env = "PATCHBOT_GITHUB_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub github_request_timeout_ms: u64,

    #[arg(
        long = "github-retry-max-attempts",
        env = "PATCHBOT_GITHUB_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize
    )]
    pub github_retry_max_attempts: usize,

    #[arg(
        long = "github-retry-base-delay-ms",
        env = "PATCHBOT_GITHUB_RETRY_BASE_DELAY_MS",
        default_value_t = 500
    )]
    pub github_retry_base_delay_ms: u64,

    #[arg(
        long = "repo-root",
        env = "PATCHBOT_REPO_ROOT",
        default_value = ".",
        help = "Path of the git checkout the pipeline operates on."
    )]
    pub repo_root: PathBuf,

    #[arg(long = "git-remote", env = "PATCHBOT_GIT_REMOTE", default_value = "origin")]
    pub git_remote: String,

    #[arg(
        long = "state-dir",
        env = "PATCHBOT_STATE_DIR",
        default_value = ".ai",
        help = "Repository-relative directory for cooldown locks, markers and audit artifacts."
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "cooldown-ms",
        env = "AI_COOLDOWN_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64
    )]
    pub cooldown_ms: u64,

    #[arg(
        long = "max-diff-bytes",
        env = "AI_MAX_DIFF_BYTES",
        default_value_t = 200_000,
        value_parser = parse_positive_usize
    )]
    pub max_diff_bytes: usize,

    #[arg(
        long = "excerpt-lines",
        env = "AI_EXCERPT_LINES",
        default_value_t = 40,
        value_parser = parse_positive_usize
    )]
    pub excerpt_lines: usize,

    #[arg(
        long = "listing-limit",
        env = "AI_LISTING_LIMIT",
        default_value_t = 2_000,
        value_parser = parse_positive_usize,
        help = "Maximum repository paths included in diff prompts."
    )]
    pub listing_limit: usize,

    #[arg(long = "ready-label", env = "AI_READY_LABEL", default_value = "ai-processed")]
    pub ready_label: String,

    #[arg(long = "blocked-label", env = "AI_BLOCKED_LABEL", default_value = "ai-blocked")]
    pub blocked_label: String,

    #[arg(long = "branch-prefix", env = "AI_BRANCH_PREFIX", default_value = "ai/issue-")]
    pub branch_prefix: String,

    #[arg(
        long = "base-branch",
        env = "AI_BASE_BRANCH",
        help = "Base for dry-run branches; defaults to the remote HEAD branch."
    )]
    pub base_branch: Option<String>,

    #[arg(long = "target-file", env = "AI_TARGET_FILE", default_value = "web/index.html")]
    pub target_file: String,

    #[arg(
        long = "allowed-files",
        env = "AI_ALLOWED_FILES",
        value_delimiter = ',',
        default_value = "index.html,web/index.html",
        help = "Exact paths the file-set variant may write."
    )]
    pub allowed_files: Vec<String>,

    #[arg(
        long = "policy-file",
        env = "AI_POLICY_FILE",
        help = "TOML file overriding the path policy lists."
    )]
    pub policy_file: Option<PathBuf>,

    #[arg(long = "commit-message", env = "AI_COMMIT_MESSAGE")]
    pub commit_message: Option<String>,

    #[arg(
        long = "git-author-name",
        env = "AI_GIT_AUTHOR_NAME",
        default_value = "github-actions[bot]"
    )]
    pub git_author_name: String,

    #[arg(
        long = "git-author-email",
        env = "AI_GIT_AUTHOR_EMAIL",
        default_value = "41898282+github-actions[bot]@users.noreply.github.com"
    )]
    pub git_author_email: String,
}

impl Cli {
    pub fn run_config_inputs(&self) -> RunConfigInputs {
        RunConfigInputs {
            repo: self.repo.clone(),
            issue_number: self.issue_number.clone(),
            actor: self.actor.clone(),
            comment_body: self.comment_body.clone(),
            variant: self.variant.into(),
            model: self.ai_model.clone(),
            repo_root: self.repo_root.clone(),
            state_dir: self.state_dir.clone(),
            cooldown_window_ms: self.cooldown_ms,
            max_diff_bytes: self.max_diff_bytes,
            excerpt_lines: self.excerpt_lines,
            listing_limit: self.listing_limit,
            ready_label: self.ready_label.clone(),
            blocked_label: self.blocked_label.clone(),
            branch_prefix: self.branch_prefix.clone(),
            base_branch: self.base_branch.clone(),
            target_file: self.target_file.clone(),
            allowed_files: self.allowed_files.clone(),
            policy_file: self.policy_file.clone(),
            commit_message: self.commit_message.clone(),
            git_author_name: self.git_author_name.clone(),
            git_author_email: self.git_author_email.clone(),
        }
    }

    /// `--github-token`/`GITHUB_TOKEN`, then `GH_TOKEN`.
    pub fn resolved_github_token(&self) -> Option<String> {
        non_empty(self.github_token.clone())
            .or_else(|| non_empty(std::env::var("GH_TOKEN").ok()))
    }

    pub fn resolved_ai_api_key(&self) -> Option<String> {
        non_empty(self.ai_api_key.clone())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
