use anyhow::{Context, Result};
use patchbot_github::DraftPullRequest;

use crate::dispatch::PipelineServices;
use crate::issue_comments::{render_dry_run_marker, render_dry_run_pull_request_body};
use crate::run_config::RunConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunOutcome {
    Created,
    Existing,
}

impl DryRunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "dry_run_created",
            Self::Existing => "dry_run_existing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub outcome: DryRunOutcome,
    pub branch: String,
    pub base_branch: String,
    pub pull_request: u64,
    pub commit_sha: Option<String>,
}

/// Runs `/ai`: resets the issue branch onto the default branch, commits a
/// marker file, force-pushes, and makes sure a draft pull request exists.
pub async fn run_dry_run(config: &RunConfig, services: &PipelineServices<'_>) -> Result<DryRunReport> {
    let tree = services.tree;
    let tracker = services.tracker;
    let branch = config.branch_name();

    tree.configure_identity(&config.git_author_name, &config.git_author_email)
        .await?;
    let base_branch = match &config.base_branch {
        Some(base) => base.clone(),
        None => tree
            .default_branch()
            .await
            .context("failed to resolve default branch")?,
    };
    tree.fetch_branch(&base_branch).await?;
    tree.checkout_fresh(&branch, &base_branch).await?;

    let marker_path = config.dry_run_marker_path();
    tree.write_file(
        &marker_path,
        &render_dry_run_marker(config.issue_number, &branch),
    )
    .await?;
    let staged = tree.stage_paths(&[marker_path.clone()]).await?;
    let commit_sha = if staged.is_empty() {
        None
    } else {
        Some(tree.commit(&config.dry_run_commit_message()).await?)
    };
    tree.push(&branch, true).await?;
    tracing::info!(
        issue = config.issue_number,
        branch = %branch,
        base = %base_branch,
        committed = commit_sha.is_some(),
        "dry-run branch pushed"
    );

    let existing = tracker.list_pull_requests(&branch).await?;
    let (outcome, pull_request) = match existing.first() {
        Some(pull) => (DryRunOutcome::Existing, pull.number),
        None => {
            let created = tracker
                .create_draft_pull_request(&DraftPullRequest {
                    title: format!("AI (dry-run): Issue #{}", config.issue_number),
                    head: branch.clone(),
                    base: base_branch.clone(),
                    body: render_dry_run_pull_request_body(&config.actor, config.issue_number),
                })
                .await
                .context("failed to create draft pull request")?;
            (DryRunOutcome::Created, created.number)
        }
    };

    tracker
        .add_label(config.issue_number, &config.ready_label)
        .await
        .context("failed to add ready label")?;
    tracing::info!(
        issue = config.issue_number,
        pull_request,
        outcome = outcome.as_str(),
        "dry-run completed"
    );

    Ok(DryRunReport {
        outcome,
        branch,
        base_branch,
        pull_request,
        commit_sha,
    })
}
