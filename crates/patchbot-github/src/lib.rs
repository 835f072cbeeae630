//! GitHub issue-tracker access for the patch pipeline.
//!
//! The pipeline talks to GitHub only through the `IssueTracker` trait. This
//! crate ships the REST-backed `GithubApiClient`, an `InMemoryIssueTracker`
//! used by tests, the wire types both share, and label helpers.

pub mod github_api_client;
pub mod github_transport_helpers;
pub mod github_types;
pub mod in_memory_tracker;
pub mod issue_labels;
pub mod issue_tracker;

pub use github_api_client::{GithubApiClient, GithubApiConfig};
pub use github_types::{
    DraftPullRequest, GithubCommentCreateResponse, GithubIssue, GithubIssueLabel,
    GithubPullRequest, GithubPullRequestHead, GithubUser, RepoRef,
};
pub use in_memory_tracker::{issue_fixture, InMemoryIssueTracker, RecordedComment};
pub use issue_labels::{issue_has_label, normalize_issue_label};
pub use issue_tracker::IssueTracker;
