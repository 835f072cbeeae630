use clap::Parser;
use patchbot_pipeline::{ChangeVariant, RunConfig, TriggerCommand};

use crate::cli_args::Cli;
use crate::cli_types::CliChangeVariant;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["patchbot"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).expect("cli parses")
}

#[test]
fn unit_cli_flags_map_onto_run_config_inputs() {
    let cli = parse(&[
        "--repo",
        "octo/widgets",
        "--issue-number",
        "42",
        "--comment-body",
        "/ai apply",
        "--variant",
        "diff",
        "--cooldown-ms",
        "5000",
        "--allowed-files",
        "web/index.html,web/app.js",
    ]);
    assert_eq!(cli.variant, CliChangeVariant::Diff);
    let inputs = cli.run_config_inputs();
    assert_eq!(inputs.variant, ChangeVariant::Diff);
    assert_eq!(inputs.cooldown_window_ms, 5_000);
    assert_eq!(
        inputs.allowed_files,
        vec!["web/index.html".to_string(), "web/app.js".to_string()]
    );

    let config = RunConfig::from_inputs(inputs).expect("config");
    assert_eq!(config.trigger(), TriggerCommand::Apply);
    assert_eq!(config.branch_name(), "ai/issue-42");
}

#[test]
fn functional_allowed_files_default_splits_on_commas() {
    let cli = parse(&["--repo", "octo/widgets", "--issue-number", "1"]);
    assert!(cli.allowed_files.contains(&"index.html".to_string()));
    assert!(cli.allowed_files.contains(&"web/index.html".to_string()));
}

#[test]
fn regression_zero_cooldown_is_rejected_by_the_parser() {
    let result = Cli::try_parse_from(["patchbot", "--cooldown-ms", "0"]);
    assert!(result.is_err());
}

#[test]
fn regression_unknown_variant_is_rejected_by_the_parser() {
    let result = Cli::try_parse_from(["patchbot", "--variant", "patch"]);
    assert!(result.is_err());
}

#[test]
fn unit_blank_secrets_resolve_to_none() {
    let cli = parse(&["--ai-api-key", "   "]);
    assert_eq!(cli.resolved_ai_api_key(), None);
    let cli = parse(&["--ai-api-key", " sk-test "]);
    assert_eq!(cli.resolved_ai_api_key().as_deref(), Some("sk-test"));
}
