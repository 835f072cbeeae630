use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const SCRUBBED_ENV: &[&str] = &[
    "REPO",
    "ISSUE_NUMBER",
    "COMMENT_BODY",
    "ACTOR",
    "AI_API_KEY",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "AI_CHANGE_VARIANT",
    "AI_POLICY_FILE",
];

fn patchbot() -> Command {
    let mut command = Command::cargo_bin("patchbot").expect("binary");
    for name in SCRUBBED_ENV {
        command.env_remove(name);
    }
    command
}

#[test]
fn integration_non_trigger_comment_exits_zero_without_credentials() {
    let temp = tempdir().expect("tempdir");
    patchbot()
        .current_dir(temp.path())
        .env("REPO", "octo/widgets")
        .env("ISSUE_NUMBER", "42")
        .env("COMMENT_BODY", "looks good to me")
        .assert()
        .success();
}

#[test]
fn integration_missing_repository_is_a_configuration_error() {
    let temp = tempdir().expect("tempdir");
    patchbot()
        .current_dir(temp.path())
        .args(["--issue-number", "42", "--comment-body", "/ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required input REPO"));
}

#[test]
fn integration_dry_run_requires_actor() {
    let temp = tempdir().expect("tempdir");
    patchbot()
        .current_dir(temp.path())
        .args([
            "--repo",
            "octo/widgets",
            "--issue-number",
            "42",
            "--comment-body",
            "/ai",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required input ACTOR"));
}

#[test]
fn integration_apply_requires_ai_api_key() {
    let temp = tempdir().expect("tempdir");
    patchbot()
        .current_dir(temp.path())
        .args([
            "--repo",
            "octo/widgets",
            "--issue-number",
            "42",
            "--comment-body",
            "/ai apply",
            "--github-token",
            "ghs_test",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required input AI_API_KEY"));
}

#[test]
fn integration_trigger_without_github_token_fails() {
    let temp = tempdir().expect("tempdir");
    patchbot()
        .current_dir(temp.path())
        .args([
            "--repo",
            "octo/widgets",
            "--issue-number",
            "42",
            "--comment-body",
            "/ai",
            "--actor",
            "alice",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required input GITHUB_TOKEN"));
}

#[test]
fn regression_invalid_policy_file_is_reported() {
    let temp = tempdir().expect("tempdir");
    let policy = temp.path().join("policy.toml");
    std::fs::write(&policy, "allow_prefixes = [\"web/\"]\nunknown = 1\n").expect("policy");
    patchbot()
        .current_dir(temp.path())
        .args([
            "--repo",
            "octo/widgets",
            "--issue-number",
            "42",
            "--comment-body",
            "/ai apply",
            "--policy-file",
        ])
        .arg(&policy)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid path policy"));
}
