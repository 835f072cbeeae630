//! `/ai apply`: request, validate, gate, apply, commit, push, and report.

use std::path::PathBuf;

use patchbot_ai::CompletionError;
use patchbot_github::IssueTracker;
use patchbot_safety::ProseFilter;
use thiserror::Error;

use crate::audit_artifact::{
    rfc3339_timestamp, sha256_hex, write_audit_artifact, AuditArtifactRecord,
    AUDIT_ARTIFACT_SCHEMA_VERSION,
};
use crate::change::{CandidateChange, ChangeApplication, ChangeApplier};
use crate::change_validation::validate_candidate_change;
use crate::cooldown_lock::CooldownDecision;
use crate::dispatch::PipelineServices;
use crate::issue_comments::{
    render_applied_comment, render_apply_conflict_comment, render_cooldown_comment,
    render_missing_pull_request_comment, render_missing_target_comment,
    render_policy_violation_comment, render_validation_failure_comment, NOT_READY_COMMENT,
    NO_CHANGES_COMMENT, QUOTA_BLOCKED_COMMENT,
};
use crate::issue_context::IssueContext;
use crate::patch_request::{build_change_prompt, request_change, PromptMaterial};
use crate::run_config::{ChangeVariant, RunConfig};
use crate::working_tree::WorkingTree;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Progress marker of an apply run, in execution order.
pub enum ApplyStage {
    Start,
    LabelChecked,
    CooldownChecked,
    BranchCheckedOut,
    ResponseReceived,
    Validated,
    PolicyPassed,
    Committed,
    Pushed,
    Commented,
    ReportedAndStopped,
}

impl ApplyStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::LabelChecked => "label_checked",
            Self::CooldownChecked => "cooldown_checked",
            Self::BranchCheckedOut => "branch_checked_out",
            Self::ResponseReceived => "response_received",
            Self::Validated => "validated",
            Self::PolicyPassed => "policy_passed",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
            Self::Commented => "commented",
            Self::ReportedAndStopped => "reported_and_stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    SkippedNotReady,
    SkippedCooldown,
    SkippedInvalid,
    SkippedPolicy,
    SkippedQuota,
    SkippedConflict,
    SkippedNoChange,
    /// Reported on the issue but still a non-zero exit.
    Failed,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::SkippedNotReady => "skipped_not_ready",
            Self::SkippedCooldown => "skipped_cooldown",
            Self::SkippedInvalid => "skipped_invalid",
            Self::SkippedPolicy => "skipped_policy",
            Self::SkippedQuota => "skipped_quota",
            Self::SkippedConflict => "skipped_conflict",
            Self::SkippedNoChange => "skipped_no_change",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub run_id: String,
    pub outcome: ApplyOutcome,
    pub reason_code: String,
    /// Stages in the order they were reached.
    pub stage_trace: Vec<ApplyStage>,
    pub pull_request: Option<u64>,
    pub commit_sha: Option<String>,
    pub changed_paths: Vec<String>,
    pub artifact_path: Option<PathBuf>,
}

impl ApplyReport {
    /// Furthest progress stage, ignoring the terminal stop marker.
    pub fn last_stage(&self) -> ApplyStage {
        self.stage_trace
            .iter()
            .rev()
            .copied()
            .find(|stage| *stage != ApplyStage::ReportedAndStopped)
            .unwrap_or(ApplyStage::Start)
    }

    pub fn reached(&self, stage: ApplyStage) -> bool {
        self.stage_trace.contains(&stage)
    }

    pub fn is_success(&self) -> bool {
        self.reached(ApplyStage::Pushed)
    }
}

#[derive(Debug, Error)]
#[error("apply run {run_id} failed after stage {}: {source:#}", .stage.as_str())]
/// Unexpected tool or network failure; the run stopped without a report.
pub struct ApplyFailure {
    pub run_id: String,
    pub stage: ApplyStage,
    #[source]
    pub source: anyhow::Error,
}

struct ApplyRun<'a> {
    config: &'a RunConfig,
    tracker: &'a dyn IssueTracker,
    tree: &'a dyn WorkingTree,
    run_id: String,
    trace: Vec<ApplyStage>,
    pull_request: Option<u64>,
}

impl<'a> ApplyRun<'a> {
    fn advance(&mut self, stage: ApplyStage) {
        self.trace.push(stage);
        tracing::info!(
            issue = self.config.issue_number,
            run_id = %self.run_id,
            stage = stage.as_str(),
            "apply stage reached"
        );
    }

    fn fail(&self, source: impl Into<anyhow::Error>) -> ApplyFailure {
        let stage = self.trace.last().copied().unwrap_or(ApplyStage::Start);
        ApplyFailure {
            run_id: self.run_id.clone(),
            stage,
            source: source.into(),
        }
    }

    async fn comment_issue(&self, body: &str) -> Result<(), ApplyFailure> {
        self.tracker
            .comment_on(self.config.issue_number, body)
            .await
            .map(|_| ())
            .map_err(|error| self.fail(error))
    }

    async fn add_blocked_label(&self) -> Result<(), ApplyFailure> {
        self.tracker
            .add_label(self.config.issue_number, &self.config.blocked_label)
            .await
            .map_err(|error| self.fail(error))
    }

    fn stop(mut self, outcome: ApplyOutcome, reason_code: &str) -> ApplyReport {
        self.trace.push(ApplyStage::ReportedAndStopped);
        tracing::info!(
            issue = self.config.issue_number,
            run_id = %self.run_id,
            outcome = outcome.as_str(),
            reason_code,
            "apply run stopped"
        );
        ApplyReport {
            run_id: self.run_id,
            outcome,
            reason_code: reason_code.to_string(),
            stage_trace: self.trace,
            pull_request: self.pull_request,
            commit_sha: None,
            changed_paths: Vec::new(),
            artifact_path: None,
        }
    }
}

/// Runs `/ai apply` for the configured issue at wall-clock time `now_ms`.
///
/// Anticipated stops come back as `Ok` reports after the issue has been
/// told why; `Err` means an unexpected failure nothing has reported yet.
pub async fn run_apply(
    config: &RunConfig,
    services: &PipelineServices<'_>,
    now_ms: u64,
) -> Result<ApplyReport, ApplyFailure> {
    let mut run = ApplyRun {
        config,
        tracker: services.tracker,
        tree: services.tree,
        run_id: format!("apply-{}-{now_ms}", config.issue_number),
        trace: Vec::new(),
        pull_request: None,
    };
    run.advance(ApplyStage::Start);

    let issue = IssueContext::fetch(run.tracker, config)
        .await
        .map_err(|error| run.fail(error))?;
    if !issue.has_label(&config.ready_label) {
        run.comment_issue(NOT_READY_COMMENT).await?;
        return Ok(run.stop(ApplyOutcome::SkippedNotReady, "not_ready"));
    }
    run.advance(ApplyStage::LabelChecked);

    let branch = config.branch_name();
    let pulls = run
        .tracker
        .list_pull_requests(&branch)
        .await
        .map_err(|error| run.fail(error))?;
    let Some(pull_request) = pulls.first().map(|pull| pull.number) else {
        run.comment_issue(&render_missing_pull_request_comment(&branch))
            .await?;
        return Ok(run.stop(ApplyOutcome::Failed, "missing_pull_request"));
    };
    run.pull_request = Some(pull_request);

    let decision = config
        .cooldown_lock()
        .check_and_record(config.issue_number, now_ms)
        .map_err(|error| run.fail(error))?;
    if let CooldownDecision::Throttled { remaining_ms } = decision {
        tracing::info!(issue = config.issue_number, remaining_ms, "cooldown active");
        run.comment_issue(&render_cooldown_comment(config.cooldown_window_ms))
            .await?;
        run.add_blocked_label().await?;
        return Ok(run.stop(ApplyOutcome::SkippedCooldown, "cooldown_active"));
    }
    run.advance(ApplyStage::CooldownChecked);

    checkout_issue_branch(run.tree, config, &branch)
        .await
        .map_err(|error| run.fail(error))?;
    run.advance(ApplyStage::BranchCheckedOut);

    let issue_text = issue.issue_text();
    let prompt = match config.variant {
        ChangeVariant::FileSet => {
            let target = run
                .tree
                .read_file(&config.target_file)
                .await
                .map_err(|error| run.fail(error))?;
            let Some(content) = target else {
                run.comment_issue(&render_missing_target_comment(&config.target_file))
                    .await?;
                return Ok(run.stop(ApplyOutcome::Failed, "missing_target_file"));
            };
            build_change_prompt(
                &issue,
                PromptMaterial::TargetFile {
                    path: &config.target_file,
                    content: &content,
                },
            )
        }
        ChangeVariant::Diff => {
            let listing = run
                .tree
                .list_files()
                .await
                .map_err(|error| run.fail(error))?
                .into_iter()
                .filter(|path| config.path_policy.evaluate(path, &issue_text).accepted)
                .take(config.listing_limit)
                .collect::<Vec<_>>();
            build_change_prompt(&issue, PromptMaterial::RepositoryListing(&listing))
        }
    };

    let Some(completion) = services.completion else {
        return Err(run.fail(anyhow::anyhow!(
            "completion client is not configured for apply runs"
        )));
    };
    let raw_output = match request_change(completion, &config.model, config.variant, prompt).await
    {
        Ok(text) => text,
        Err(error) if error.is_quota_exhausted() => {
            return report_quota_block(run, pull_request, &error).await;
        }
        Err(error) => return Err(run.fail(error)),
    };
    run.advance(ApplyStage::ResponseReceived);

    let prose_filter = ProseFilter::with_default_phrases().map_err(|error| run.fail(error))?;
    let default_summary = format!(
        "Applied AI-generated change for issue #{}.",
        config.issue_number
    );
    let change = match validate_candidate_change(
        config.variant,
        &raw_output,
        &prose_filter,
        config.max_diff_bytes,
        &default_summary,
    ) {
        Ok(change) => change,
        Err(error) => {
            tracing::warn!(
                issue = config.issue_number,
                reason_code = error.reason_code(),
                "model output rejected"
            );
            run.comment_issue(&render_validation_failure_comment(
                &error,
                &raw_output,
                config.excerpt_lines,
            ))
            .await?;
            return Ok(run.stop(ApplyOutcome::SkippedInvalid, error.reason_code()));
        }
    };
    run.advance(ApplyStage::Validated);

    let touched_paths = change.touched_paths();
    for path in &touched_paths {
        let decision = config.path_policy.evaluate(path, &issue_text);
        if !decision.accepted {
            tracing::warn!(
                issue = config.issue_number,
                path = %path,
                reason_code = decision.reason_code,
                "path rejected by policy"
            );
            run.comment_issue(&render_policy_violation_comment(path, &decision))
                .await?;
            return Ok(run.stop(ApplyOutcome::SkippedPolicy, decision.reason_code));
        }
    }
    run.advance(ApplyStage::PolicyPassed);

    match change.apply(run.tree).await.map_err(|error| run.fail(error))? {
        ChangeApplication::Applied => {}
        ChangeApplication::AlreadyApplied => {
            run.comment_issue(NO_CHANGES_COMMENT).await?;
            return Ok(run.stop(ApplyOutcome::SkippedNoChange, "no_op_change"));
        }
        ChangeApplication::Conflict { diagnostic } => {
            run.comment_issue(&render_apply_conflict_comment(
                &branch,
                &diagnostic,
                config.excerpt_lines,
            ))
            .await?;
            return Ok(run.stop(ApplyOutcome::SkippedConflict, "apply_conflict"));
        }
    }

    let staged = run
        .tree
        .stage_paths(&touched_paths)
        .await
        .map_err(|error| run.fail(error))?;
    if staged.is_empty() {
        run.comment_issue(NO_CHANGES_COMMENT).await?;
        return Ok(run.stop(ApplyOutcome::SkippedNoChange, "no_op_change"));
    }

    let commit_sha = run
        .tree
        .commit(&config.apply_commit_message())
        .await
        .map_err(|error| run.fail(error))?;
    run.advance(ApplyStage::Committed);

    run.tree
        .push(&branch, false)
        .await
        .map_err(|error| run.fail(error))?;
    run.advance(ApplyStage::Pushed);

    let summary = change
        .summary()
        .map(ToOwned::to_owned)
        .unwrap_or(default_summary);
    let artifact_path = write_run_artifact(
        config,
        &run.run_id,
        &branch,
        &commit_sha,
        &staged,
        &summary,
        &change,
        now_ms,
    );

    let body = render_applied_comment(&summary, change.notes(), &commit_sha, &staged);
    match run.tracker.comment_on(pull_request, &body).await {
        Ok(_) => run.advance(ApplyStage::Commented),
        Err(error) => tracing::warn!(
            issue = config.issue_number,
            pull_request,
            error = %error,
            "failed to post applied summary comment"
        ),
    }

    tracing::info!(
        issue = config.issue_number,
        run_id = %run.run_id,
        variant = config.variant.as_str(),
        commit = %commit_sha,
        changed = staged.len(),
        "apply run completed"
    );
    Ok(ApplyReport {
        run_id: run.run_id,
        outcome: ApplyOutcome::Applied,
        reason_code: "applied".to_string(),
        stage_trace: run.trace,
        pull_request: Some(pull_request),
        commit_sha: Some(commit_sha),
        changed_paths: staged,
        artifact_path,
    })
}

async fn checkout_issue_branch(
    tree: &dyn WorkingTree,
    config: &RunConfig,
    branch: &str,
) -> anyhow::Result<()> {
    tree.configure_identity(&config.git_author_name, &config.git_author_email)
        .await?;
    tree.fetch_branch(branch).await?;
    tree.checkout_existing(branch).await
}

async fn report_quota_block(
    run: ApplyRun<'_>,
    pull_request: u64,
    error: &CompletionError,
) -> Result<ApplyReport, ApplyFailure> {
    tracing::warn!(
        issue = run.config.issue_number,
        status = error.status().unwrap_or_default(),
        "completion quota exhausted"
    );
    run.comment_issue(QUOTA_BLOCKED_COMMENT).await?;
    run.tracker
        .comment_on(pull_request, QUOTA_BLOCKED_COMMENT)
        .await
        .map_err(|error| run.fail(error))?;
    run.add_blocked_label().await?;
    Ok(run.stop(ApplyOutcome::SkippedQuota, "quota_exhausted"))
}

#[allow(clippy::too_many_arguments)]
fn write_run_artifact(
    config: &RunConfig,
    run_id: &str,
    branch: &str,
    commit_sha: &str,
    changed_paths: &[String],
    summary: &str,
    change: &CandidateChange,
    now_ms: u64,
) -> Option<PathBuf> {
    let record = AuditArtifactRecord {
        schema_version: AUDIT_ARTIFACT_SCHEMA_VERSION,
        run_id: run_id.to_string(),
        repo: config.repo.as_slug(),
        issue_number: config.issue_number,
        variant: change.variant().as_str().to_string(),
        branch: branch.to_string(),
        commit_sha: commit_sha.to_string(),
        changed_paths: changed_paths.to_vec(),
        summary: summary.to_string(),
        notes: change.notes().map(ToOwned::to_owned),
        model: config.model.clone(),
        payload_sha256: sha256_hex(change.payload().as_bytes()),
        created_unix_ms: now_ms,
        created_at: rfc3339_timestamp(now_ms),
    };
    match write_audit_artifact(&config.state_dir_path(), &record) {
        Ok(path) => Some(path),
        Err(error) => {
            tracing::warn!(
                issue = config.issue_number,
                run_id,
                error = %error,
                "failed to write audit artifact"
            );
            None
        }
    }
}
