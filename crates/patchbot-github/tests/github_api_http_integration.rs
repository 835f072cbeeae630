use httpmock::prelude::*;
use patchbot_github::{DraftPullRequest, GithubApiClient, GithubApiConfig, IssueTracker, RepoRef};
use serde_json::json;

fn test_client(base_url: String, retry_max_attempts: usize) -> GithubApiClient {
    GithubApiClient::new(GithubApiConfig {
        api_base: base_url,
        token: "ghs-test-token".to_string(),
        repo: RepoRef::parse("octo/widgets").expect("repo"),
        request_timeout_ms: 5_000,
        retry_max_attempts,
        retry_base_delay_ms: 1,
    })
    .expect("client")
}

#[tokio::test]
async fn integration_get_issue_decodes_labels_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/octo/widgets/issues/42")
            .header("authorization", "Bearer ghs-test-token")
            .header("x-github-api-version", "2022-11-28");
        then.status(200).json_body(json!({
            "id": 4200,
            "number": 42,
            "title": "Add dark mode toggle",
            "body": "Please add a toggle.",
            "state": "open",
            "user": {"login": "alice"},
            "labels": [{"name": "AI-Processed"}]
        }));
    });

    let client = test_client(server.base_url(), 1);
    let issue = client.get_issue(42).await.expect("issue");
    mock.assert();
    assert_eq!(issue.title, "Add dark mode toggle");
    assert_eq!(issue.body.as_deref(), Some("Please add a toggle."));
    assert_eq!(issue.label_names().collect::<Vec<_>>(), vec!["AI-Processed"]);
}

#[tokio::test]
async fn integration_list_pull_requests_scopes_head_to_repo_owner() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/octo/widgets/pulls")
            .query_param("state", "open")
            .query_param("head", "octo:ai/issue-42");
        then.status(200).json_body(json!([
            {"number": 77, "title": "AI (dry-run): Issue #42", "draft": true,
             "head": {"ref": "ai/issue-42"}},
            {"number": 78, "title": "unrelated", "head": {"ref": "ai/issue-420"}}
        ]));
    });

    let client = test_client(server.base_url(), 1);
    let pulls = client
        .list_pull_requests("ai/issue-42")
        .await
        .expect("pulls");
    mock.assert();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].number, 77);
}

#[tokio::test]
async fn integration_create_draft_pull_request_posts_draft_flag() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/widgets/pulls")
            .json_body_includes(
                json!({"head": "ai/issue-42", "base": "main", "draft": true}).to_string(),
            );
        then.status(201).json_body(json!({
            "number": 77,
            "title": "AI (dry-run): Issue #42",
            "draft": true,
            "head": {"ref": "ai/issue-42"}
        }));
    });

    let client = test_client(server.base_url(), 1);
    let pull = client
        .create_draft_pull_request(&DraftPullRequest {
            title: "AI (dry-run): Issue #42".to_string(),
            head: "ai/issue-42".to_string(),
            base: "main".to_string(),
            body: "Dry-run PR".to_string(),
        })
        .await
        .expect("pull");
    mock.assert();
    assert_eq!(pull.number, 77);
}

#[tokio::test]
async fn integration_comment_and_label_posts_expected_payloads() {
    let server = MockServer::start();
    let comment = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/widgets/issues/42/comments")
            .json_body_includes(json!({"body": "Cooldown active"}).to_string());
        then.status(201).json_body(json!({"id": 9001}));
    });
    let label = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/widgets/issues/42/labels")
            .json_body_includes(json!({"labels": ["ai-blocked"]}).to_string());
        then.status(200).json_body(json!([{"name": "ai-blocked"}]));
    });

    let client = test_client(server.base_url(), 1);
    let created = client
        .comment_on(42, "Cooldown active")
        .await
        .expect("comment");
    client.add_label(42, "ai-blocked").await.expect("label");
    comment.assert();
    label.assert();
    assert_eq!(created.id, 9001);
}

#[tokio::test]
async fn regression_transient_server_errors_are_retried_until_budget_exhausted() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/42");
        then.status(503).body("unavailable");
    });

    let client = test_client(server.base_url(), 3);
    let error = client.get_issue(42).await.expect_err("should fail");
    mock.assert_calls(3);
    assert!(error.to_string().contains("status 503"));
}

#[tokio::test]
async fn regression_client_errors_are_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/42");
        then.status(404).json_body(json!({"message": "Not Found"}));
    });

    let client = test_client(server.base_url(), 3);
    let error = client.get_issue(42).await.expect_err("should fail");
    mock.assert_calls(1);
    assert!(error.to_string().contains("status 404"));
}
