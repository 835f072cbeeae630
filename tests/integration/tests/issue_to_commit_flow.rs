use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use httpmock::prelude::*;
use patchbot_ai::{
    CompletionClient, CompletionError, CompletionRequest, CompletionResponse, CompletionUsage,
};
use patchbot_github::{
    issue_fixture, GithubApiClient, GithubApiConfig, InMemoryIssueTracker, RepoRef,
};
use patchbot_pipeline::{
    run_trigger_at, ApplyOutcome, ChangeVariant, DryRunOutcome, InMemoryWorkingTree,
    PipelineServices, RunConfig, RunConfigInputs, RunOutcome,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::Mutex as AsyncMutex;

const START_MS: u64 = 1_760_000_000_000;

struct ScriptedClient {
    responses: AsyncMutex<VecDeque<String>>,
    requests: AsyncMutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().await.push(request);
        let text = self.responses.lock().await.pop_front().ok_or_else(|| {
            CompletionError::InvalidResponse("scripted response queue exhausted".into())
        })?;
        Ok(CompletionResponse {
            text,
            status: Some("completed".to_string()),
            usage: CompletionUsage::default(),
        })
    }
}

fn run_config(repo_root: &Path, comment_body: &str) -> RunConfig {
    RunConfig::from_inputs(RunConfigInputs {
        repo: Some("octo/widgets".to_string()),
        issue_number: Some("42".to_string()),
        actor: Some("alice".to_string()),
        comment_body: comment_body.to_string(),
        variant: ChangeVariant::FileSet,
        repo_root: repo_root.to_path_buf(),
        ..RunConfigInputs::default()
    })
    .expect("run config")
}

fn dark_mode_change() -> String {
    json!({
        "files": [{"path": "web/index.html", "content": "<body class=\"dark\"></body>\n"}],
        "summary": "Added dark mode"
    })
    .to_string()
}

#[tokio::test]
async fn integration_dry_run_then_apply_produces_one_commit_on_issue_branch() {
    let temp = tempdir().expect("tempdir");
    let tracker = InMemoryIssueTracker::new().with_issue(issue_fixture(
        42,
        "Add dark mode toggle",
        "Make the landing page dark.",
        &[],
    ));
    let tree = InMemoryWorkingTree::new().with_file("web/index.html", "<body></body>\n");
    let client = ScriptedClient::new(vec![dark_mode_change()]);
    let services = PipelineServices {
        tracker: &tracker,
        completion: Some(&client),
        tree: &tree,
    };

    let dry_run = run_trigger_at(&run_config(temp.path(), "/ai"), &services, START_MS).await;
    let RunOutcome::DryRun(report) = &dry_run else {
        panic!("expected dry-run report, got {dry_run:?}");
    };
    assert_eq!(report.outcome, DryRunOutcome::Created);
    let pull_request = report.pull_request;
    assert_eq!(tracker.labels_added(42), vec!["ai-processed".to_string()]);

    let apply = run_trigger_at(
        &run_config(temp.path(), "/ai apply"),
        &services,
        START_MS + 1_000,
    )
    .await;
    assert_eq!(apply.exit_code(), 0);
    let RunOutcome::Apply(report) = &apply else {
        panic!("expected apply report, got {apply:?}");
    };
    assert_eq!(report.outcome, ApplyOutcome::Applied);
    assert_eq!(report.pull_request, Some(pull_request));
    assert_eq!(
        tree.file("web/index.html").as_deref(),
        Some("<body class=\"dark\"></body>\n")
    );

    let commits = tree.commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].paths, vec!["web/index.html".to_string()]);
    assert!(tree.pushes().iter().all(|push| push.branch == "ai/issue-42"));
    assert!(tracker.comments_on(pull_request)[0].starts_with("Summary: Added dark mode"));
    assert_eq!(client.request_count().await, 1);
}

#[tokio::test]
async fn integration_second_apply_inside_window_is_throttled() {
    let temp = tempdir().expect("tempdir");
    let tracker = InMemoryIssueTracker::new()
        .with_issue(issue_fixture(42, "t", "b", &["ai-processed"]))
        .with_pull_request(77, "ai/issue-42");
    let tree = InMemoryWorkingTree::new()
        .with_file("web/index.html", "<body></body>\n")
        .with_remote_branch("ai/issue-42");
    let client = ScriptedClient::new(vec![dark_mode_change(), dark_mode_change()]);
    let services = PipelineServices {
        tracker: &tracker,
        completion: Some(&client),
        tree: &tree,
    };
    let config = run_config(temp.path(), "/ai apply");

    let first = run_trigger_at(&config, &services, START_MS).await;
    assert_eq!(first.reason_code(), "applied");
    let second = run_trigger_at(&config, &services, START_MS + 60_000).await;
    assert_eq!(second.exit_code(), 0);
    assert_eq!(second.reason_code(), "cooldown_active");
    assert_eq!(client.request_count().await, 1);
    assert_eq!(tracker.labels_added(42), vec!["ai-blocked".to_string()]);
    assert_eq!(tree.commits().len(), 1);
}

#[tokio::test]
async fn integration_apply_over_github_rest_reports_summary_on_pull_request() {
    let temp = tempdir().expect("tempdir");
    let server = MockServer::start();
    let issue = server.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/42");
        then.status(200).json_body(json!({
            "id": 4200,
            "number": 42,
            "title": "Add dark mode toggle",
            "body": "Make the landing page dark.",
            "state": "open",
            "user": {"login": "alice"},
            "labels": [{"name": "ai-processed"}]
        }));
    });
    let pulls = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/octo/widgets/pulls")
            .query_param("head", "octo:ai/issue-42");
        then.status(200).json_body(json!([
            {"number": 77, "title": "AI (dry-run): Issue #42", "draft": true,
             "head": {"ref": "ai/issue-42"}}
        ]));
    });
    let summary = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/widgets/issues/77/comments")
            .body_includes("Summary: Added dark mode");
        then.status(201).json_body(json!({
            "id": 9001,
            "html_url": "https://github.com/octo/widgets/pull/77#issuecomment-9001"
        }));
    });

    let tracker = GithubApiClient::new(GithubApiConfig {
        api_base: server.base_url(),
        token: "ghs-test-token".to_string(),
        repo: RepoRef::parse("octo/widgets").expect("repo"),
        request_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("github client");
    let tree = InMemoryWorkingTree::new()
        .with_file("web/index.html", "<body></body>\n")
        .with_remote_branch("ai/issue-42");
    let client = ScriptedClient::new(vec![dark_mode_change()]);
    let services = PipelineServices {
        tracker: &tracker,
        completion: Some(&client),
        tree: &tree,
    };

    let outcome = run_trigger_at(&run_config(temp.path(), "/ai apply"), &services, START_MS).await;
    assert_eq!(outcome.reason_code(), "applied");
    issue.assert();
    pulls.assert();
    summary.assert();
}

#[tokio::test]
async fn integration_exhausted_script_surfaces_as_reported_failure() {
    let temp = tempdir().expect("tempdir");
    let tracker = InMemoryIssueTracker::new()
        .with_issue(issue_fixture(42, "t", "b", &["ai-processed"]))
        .with_pull_request(77, "ai/issue-42");
    let tree = InMemoryWorkingTree::new()
        .with_file("web/index.html", "<body></body>\n")
        .with_remote_branch("ai/issue-42");
    let client = ScriptedClient::new(Vec::new());
    let services = PipelineServices {
        tracker: &tracker,
        completion: Some(&client),
        tree: &tree,
    };

    let outcome = run_trigger_at(&run_config(temp.path(), "/ai apply"), &services, START_MS).await;
    assert_eq!(outcome.exit_code(), 1);
    let comments = tracker.comments_on(42);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("scripted response queue exhausted"));
    assert!(tree.commits().is_empty());
}
