use anyhow::Result;
use async_trait::async_trait;

use crate::{DraftPullRequest, GithubCommentCreateResponse, GithubIssue, GithubPullRequest};

/// GitHub refuses comment bodies above this many characters.
pub const GITHUB_COMMENT_MAX_CHARS: usize = 65_000;

#[async_trait]
/// Issue-tracker operations the pipeline depends on.
///
/// Pull requests share the issue number space, so `comment_on` and
/// `add_label` accept either kind of number.
pub trait IssueTracker: Send + Sync {
    async fn get_issue(&self, number: u64) -> Result<GithubIssue>;

    /// Open pull requests whose head branch is `head_branch`.
    async fn list_pull_requests(&self, head_branch: &str) -> Result<Vec<GithubPullRequest>>;

    async fn comment_on(&self, number: u64, body: &str) -> Result<GithubCommentCreateResponse>;

    async fn create_draft_pull_request(&self, draft: &DraftPullRequest)
        -> Result<GithubPullRequest>;

    async fn add_label(&self, number: u64, label: &str) -> Result<()>;
}
