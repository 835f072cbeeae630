use anyhow::{anyhow, Context, Result};
use patchbot_ai::{CompletionClient, ResponsesClient, ResponsesConfig};
use patchbot_github::{GithubApiClient, GithubApiConfig};
use patchbot_pipeline::{
    run_trigger, GitWorkingTree, PipelineServices, RunConfig, TriggerCommand,
};

use crate::cli_args::Cli;

/// Runs one invocation and returns the process exit code.
pub(crate) async fn run_cli(cli: Cli) -> Result<u8> {
    let config =
        RunConfig::from_inputs(cli.run_config_inputs()).context("invalid configuration")?;
    let trigger = config.trigger();
    if trigger == TriggerCommand::None {
        tracing::info!(
            issue = config.issue_number,
            "comment is not a trigger command; nothing to do"
        );
        return Ok(0);
    }

    let github_token = cli
        .resolved_github_token()
        .ok_or_else(|| anyhow!("missing required input GITHUB_TOKEN"))?;
    let tracker = GithubApiClient::new(GithubApiConfig {
        api_base: cli.github_api_base.clone(),
        token: github_token,
        repo: config.repo.clone(),
        request_timeout_ms: cli.github_request_timeout_ms,
        retry_max_attempts: cli.github_retry_max_attempts,
        retry_base_delay_ms: cli.github_retry_base_delay_ms,
    })?;

    let completion = match trigger {
        TriggerCommand::Apply => {
            let api_key = cli
                .resolved_ai_api_key()
                .ok_or_else(|| anyhow!("missing required input AI_API_KEY"))?;
            Some(ResponsesClient::new(ResponsesConfig {
                api_base: cli.ai_api_base.clone(),
                api_key,
                organization: cli.ai_organization.clone(),
                request_timeout_ms: cli.ai_request_timeout_ms,
            })?)
        }
        TriggerCommand::DryRun | TriggerCommand::None => None,
    };

    let tree = GitWorkingTree::new(&config.repo_root).with_remote(cli.git_remote.clone());
    let services = PipelineServices {
        tracker: &tracker,
        completion: completion
            .as_ref()
            .map(|client| client as &dyn CompletionClient),
        tree: &tree,
    };

    let outcome = run_trigger(&config, &services).await;
    let exit_code = outcome.exit_code();
    tracing::info!(
        issue = config.issue_number,
        trigger = trigger.as_str(),
        reason_code = %outcome.reason_code(),
        exit_code,
        "pipeline finished"
    );
    Ok(exit_code)
}
