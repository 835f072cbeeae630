use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use patchbot_core::truncate_for_error;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::github_transport_helpers::{
    is_retryable_github_status, is_retryable_transport_error, parse_retry_after, retry_delay,
};
use crate::issue_tracker::GITHUB_COMMENT_MAX_CHARS;
use crate::{
    DraftPullRequest, GithubCommentCreateResponse, GithubIssue, GithubIssueLabel,
    GithubPullRequest, IssueTracker, RepoRef,
};

#[derive(Debug, Clone)]
/// Connection settings for the GitHub REST API.
pub struct GithubApiConfig {
    pub api_base: String,
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone)]
/// REST-backed `IssueTracker` scoped to one repository.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(config: GithubApiConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("patchbot-issue-automation"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            repo: config.repo,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.repo.owner, self.repo.name, suffix
        )
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-patchbot-retry-attempt", (attempt - 1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_github_status(status.as_u16())
                    {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        tracing::warn!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying github request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, None);
                        tracing::warn!(operation, attempt, error = %error, "retrying github request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GithubApiClient {
    async fn get_issue(&self, number: u64) -> Result<GithubIssue> {
        let url = self.repo_url(&format!("issues/{number}"));
        self.request_json("get issue", || self.http.get(&url)).await
    }

    async fn list_pull_requests(&self, head_branch: &str) -> Result<Vec<GithubPullRequest>> {
        let url = self.repo_url("pulls");
        let head = format!("{}:{}", self.repo.owner, head_branch);
        let pulls: Vec<GithubPullRequest> = self
            .request_json("list pull requests", || {
                self.http.get(&url).query(&[
                    ("state", "open"),
                    ("head", head.as_str()),
                    ("per_page", "100"),
                ])
            })
            .await?;
        Ok(pulls
            .into_iter()
            .filter(|pull| pull.head.ref_name == head_branch)
            .collect())
    }

    async fn comment_on(&self, number: u64, body: &str) -> Result<GithubCommentCreateResponse> {
        let url = self.repo_url(&format!("issues/{number}/comments"));
        let payload = json!({ "body": truncate_for_error(body, GITHUB_COMMENT_MAX_CHARS) });
        self.request_json("create issue comment", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn create_draft_pull_request(
        &self,
        draft: &DraftPullRequest,
    ) -> Result<GithubPullRequest> {
        let url = self.repo_url("pulls");
        let payload = json!({
            "title": draft.title,
            "head": draft.head,
            "base": draft.base,
            "body": draft.body,
            "draft": true,
        });
        self.request_json("create draft pull request", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let url = self.repo_url(&format!("issues/{number}/labels"));
        let payload = json!({ "labels": [label] });
        let _labels: Vec<GithubIssueLabel> = self
            .request_json("add issue label", || self.http.post(&url).json(&payload))
            .await?;
        Ok(())
    }
}
