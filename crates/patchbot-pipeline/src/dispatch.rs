use patchbot_ai::CompletionClient;
use patchbot_core::current_unix_timestamp_ms;
use patchbot_github::IssueTracker;

use crate::apply_runner::{run_apply, ApplyOutcome, ApplyReport};
use crate::dry_run::{run_dry_run, DryRunReport};
use crate::issue_comments::render_run_failure_comment;
use crate::run_config::RunConfig;
use crate::trigger_command::TriggerCommand;
use crate::working_tree::WorkingTree;

#[derive(Clone, Copy)]
/// External collaborators for one invocation.
pub struct PipelineServices<'a> {
    pub tracker: &'a dyn IssueTracker,
    /// Only apply runs call the completion backend.
    pub completion: Option<&'a dyn CompletionClient>,
    pub tree: &'a dyn WorkingTree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The comment was not a trigger.
    Ignored,
    DryRun(DryRunReport),
    Apply(ApplyReport),
    /// Unexpected failure, reported on the issue on a best-effort basis.
    Failed {
        run_id: String,
        stage: String,
        error: String,
    },
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Ignored | Self::DryRun(_) => 0,
            Self::Apply(report) if report.outcome == ApplyOutcome::Failed => 1,
            Self::Apply(_) => 0,
            Self::Failed { .. } => 1,
        }
    }

    pub fn reason_code(&self) -> String {
        match self {
            Self::Ignored => "ignored".to_string(),
            Self::DryRun(report) => report.outcome.as_str().to_string(),
            Self::Apply(report) => report.reason_code.clone(),
            Self::Failed { .. } => "failed".to_string(),
        }
    }
}

pub async fn run_trigger(config: &RunConfig, services: &PipelineServices<'_>) -> RunOutcome {
    run_trigger_at(config, services, current_unix_timestamp_ms()).await
}

/// Dispatches the parsed trigger; `now_ms` drives the cooldown and run ids.
pub async fn run_trigger_at(
    config: &RunConfig,
    services: &PipelineServices<'_>,
    now_ms: u64,
) -> RunOutcome {
    let trigger = config.trigger();
    tracing::info!(
        issue = config.issue_number,
        trigger = trigger.as_str(),
        variant = config.variant.as_str(),
        "dispatching issue comment"
    );
    match trigger {
        TriggerCommand::None => RunOutcome::Ignored,
        TriggerCommand::DryRun => match run_dry_run(config, services).await {
            Ok(report) => RunOutcome::DryRun(report),
            Err(error) => {
                let run_id = format!("dry-run-{}-{now_ms}", config.issue_number);
                report_failure(config, services, run_id, "dry_run", format!("{error:#}")).await
            }
        },
        TriggerCommand::Apply => match run_apply(config, services, now_ms).await {
            Ok(report) => RunOutcome::Apply(report),
            Err(failure) => {
                let stage = failure.stage.as_str();
                let message = format!("{:#}", failure.source);
                report_failure(config, services, failure.run_id, stage, message).await
            }
        },
    }
}

async fn report_failure(
    config: &RunConfig,
    services: &PipelineServices<'_>,
    run_id: String,
    stage: &str,
    error: String,
) -> RunOutcome {
    tracing::error!(
        issue = config.issue_number,
        run_id = %run_id,
        stage,
        error = %error,
        "pipeline run failed"
    );
    let body = render_run_failure_comment(&run_id, stage, &error);
    if let Err(comment_error) = services
        .tracker
        .comment_on(config.issue_number, &body)
        .await
    {
        tracing::warn!(
            issue = config.issue_number,
            error = %comment_error,
            "failed to post failure comment"
        );
    }
    RunOutcome::Failed {
        run_id,
        stage: stage.to_string(),
        error,
    }
}
