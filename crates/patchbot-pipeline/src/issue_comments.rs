use patchbot_core::{leading_lines_excerpt, truncate_for_error};
use patchbot_safety::PathPolicyDecision;

use crate::change_validation::ChangeValidationError;

pub const NOT_READY_COMMENT: &str = "Please run /ai first (dry-run) before /ai apply.";
pub const QUOTA_BLOCKED_COMMENT: &str = "AI apply blocked: OpenAI quota/billing exhausted for AI_API_KEY. Please fix billing or update the key, then re-run /ai apply.";
pub const NO_CHANGES_COMMENT: &str = "No changes detected after applying AI output.";
pub const RUN_ERROR_MAX_CHARS: usize = 600;
const EXCERPT_MAX_CHARS: usize = 4_000;

pub fn render_cooldown_comment(window_ms: u64) -> String {
    let minutes = window_ms.div_ceil(60_000).max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!("Cooldown active, try again in {minutes} {unit}.")
}

pub fn render_missing_pull_request_comment(branch: &str) -> String {
    format!("No open pull request found for branch `{branch}`. {NOT_READY_COMMENT}")
}

pub fn render_missing_target_comment(path: &str) -> String {
    format!("Missing required file: {path}.")
}

/// Validation failure plus the first lines of the raw model output.
pub fn render_validation_failure_comment(
    error: &ChangeValidationError,
    raw_output: &str,
    excerpt_lines: usize,
) -> String {
    let mut body = format!("{error} Please refine the issue and try again.");
    if !raw_output.trim().is_empty() {
        let excerpt = truncate_for_error(
            &leading_lines_excerpt(raw_output.trim(), excerpt_lines),
            EXCERPT_MAX_CHARS,
        );
        body.push_str(&format!(
            "\n\nFirst lines of the AI response:\n\n~~~text\n{excerpt}\n~~~"
        ));
    }
    body
}

pub fn render_policy_violation_comment(path: &str, decision: &PathPolicyDecision) -> String {
    if decision.is_unsafe_path() {
        return format!(
            "AI response contained an unsafe file path: `{path}` (`{}`).",
            decision.reason_code
        );
    }
    format!(
        "AI response attempted to write a non-allowlisted path: {path}. (`{}`)",
        decision.reason_code
    )
}

pub fn render_apply_conflict_comment(branch: &str, diagnostic: &str, excerpt_lines: usize) -> String {
    let excerpt = truncate_for_error(
        &leading_lines_excerpt(diagnostic.trim(), excerpt_lines),
        EXCERPT_MAX_CHARS,
    );
    format!(
        "AI diff does not apply cleanly to `{branch}`; nothing was changed.\n\n~~~text\n{excerpt}\n~~~"
    )
}

/// Pull-request comment posted after a successful push.
pub fn render_applied_comment(
    summary: &str,
    notes: Option<&str>,
    commit_sha: &str,
    changed_paths: &[String],
) -> String {
    let mut body = format!("Summary: {summary}");
    if let Some(notes) = notes.filter(|notes| !notes.trim().is_empty()) {
        body.push_str(&format!("\n\nNotes: {notes}"));
    }
    let short_sha = commit_sha.get(..12).unwrap_or(commit_sha);
    body.push_str(&format!("\n\nCommit: `{short_sha}`"));
    if !changed_paths.is_empty() {
        body.push_str("\nChanged files:");
        for path in changed_paths {
            body.push_str(&format!("\n- `{path}`"));
        }
    }
    body
}

pub fn render_run_failure_comment(run_id: &str, stage: &str, error_message: &str) -> String {
    format!(
        "AI run `{run_id}` failed during `{stage}`.\n\nError: `{}`",
        truncate_for_error(error_message, RUN_ERROR_MAX_CHARS)
    )
}

pub fn render_dry_run_pull_request_body(actor: &str, issue_number: u64) -> String {
    [
        format!("Triggered by: @{actor}"),
        String::new(),
        "This is a **dry-run draft PR**.".to_string(),
        "Comment `/ai apply` on the issue to generate the change on this branch.".to_string(),
        String::new(),
        format!("- Source issue: #{issue_number}"),
    ]
    .join("\n")
}

pub fn render_dry_run_marker(issue_number: u64, branch: &str) -> String {
    format!(
        "# AI Dry Run\n\nThis file is a placeholder created by the issue automation.\n\n- Issue: #{issue_number}\n- Branch: {branch}\n"
    )
}
