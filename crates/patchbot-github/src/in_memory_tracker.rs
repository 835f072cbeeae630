use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    DraftPullRequest, GithubCommentCreateResponse, GithubIssue, GithubIssueLabel,
    GithubPullRequest, GithubPullRequestHead, GithubUser, IssueTracker,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub number: u64,
    pub body: String,
}

#[derive(Debug, Default)]
struct TrackerState {
    issues: BTreeMap<u64, GithubIssue>,
    pull_requests: Vec<GithubPullRequest>,
    comments: Vec<RecordedComment>,
    labels_added: Vec<(u64, String)>,
}

#[derive(Debug, Default)]
/// Process-local tracker that records every write for later inspection.
pub struct InMemoryIssueTracker {
    state: Mutex<TrackerState>,
}

impl InMemoryIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(self, issue: GithubIssue) -> Self {
        self.lock().issues.insert(issue.number, issue);
        self
    }

    pub fn with_pull_request(self, number: u64, head_branch: &str) -> Self {
        self.lock().pull_requests.push(GithubPullRequest {
            number,
            title: format!("PR #{number}"),
            draft: true,
            html_url: None,
            head: GithubPullRequestHead {
                ref_name: head_branch.to_string(),
            },
        });
        self
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        self.lock().comments.clone()
    }

    pub fn comments_on(&self, number: u64) -> Vec<String> {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.number == number)
            .map(|comment| comment.body.clone())
            .collect()
    }

    pub fn labels_added(&self, number: u64) -> Vec<String> {
        self.lock()
            .labels_added
            .iter()
            .filter(|(target, _)| *target == number)
            .map(|(_, label)| label.clone())
            .collect()
    }

    pub fn pull_requests(&self) -> Vec<GithubPullRequest> {
        self.lock().pull_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IssueTracker for InMemoryIssueTracker {
    async fn get_issue(&self, number: u64) -> Result<GithubIssue> {
        self.lock()
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow!("github api get issue failed with status 404: Not Found"))
    }

    async fn list_pull_requests(&self, head_branch: &str) -> Result<Vec<GithubPullRequest>> {
        Ok(self
            .lock()
            .pull_requests
            .iter()
            .filter(|pull| pull.head.ref_name == head_branch)
            .cloned()
            .collect())
    }

    async fn comment_on(&self, number: u64, body: &str) -> Result<GithubCommentCreateResponse> {
        let mut state = self.lock();
        state.comments.push(RecordedComment {
            number,
            body: body.to_string(),
        });
        Ok(GithubCommentCreateResponse {
            id: state.comments.len() as u64,
            html_url: None,
        })
    }

    async fn create_draft_pull_request(
        &self,
        draft: &DraftPullRequest,
    ) -> Result<GithubPullRequest> {
        let mut state = self.lock();
        let issue_max = state.issues.keys().max().copied().unwrap_or(0);
        let pull_max = state
            .pull_requests
            .iter()
            .map(|pull| pull.number)
            .max()
            .unwrap_or(0);
        let pull = GithubPullRequest {
            number: issue_max.max(pull_max) + 1,
            title: draft.title.clone(),
            draft: true,
            html_url: None,
            head: GithubPullRequestHead {
                ref_name: draft.head.clone(),
            },
        };
        state.pull_requests.push(pull.clone());
        Ok(pull)
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let mut state = self.lock();
        state.labels_added.push((number, label.to_string()));
        if let Some(issue) = state.issues.get_mut(&number) {
            if !issue.label_names().any(|existing| existing == label) {
                issue.labels.push(GithubIssueLabel {
                    name: label.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Builds an open issue authored by `octo` with the given labels.
pub fn issue_fixture(number: u64, title: &str, body: &str, labels: &[&str]) -> GithubIssue {
    GithubIssue {
        id: 1_000 + number,
        number,
        title: title.to_string(),
        body: Some(body.to_string()),
        state: "open".to_string(),
        user: GithubUser {
            login: "octo".to_string(),
        },
        labels: labels
            .iter()
            .map(|name| GithubIssueLabel {
                name: (*name).to_string(),
            })
            .collect(),
        html_url: None,
        pull_request: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{issue_fixture, InMemoryIssueTracker};
    use crate::{DraftPullRequest, IssueTracker};

    #[tokio::test]
    async fn unit_in_memory_tracker_filters_pull_requests_by_head_branch() {
        let tracker = InMemoryIssueTracker::new()
            .with_pull_request(7, "ai/issue-3")
            .with_pull_request(8, "feature/other");
        let pulls = tracker
            .list_pull_requests("ai/issue-3")
            .await
            .expect("list pulls");
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].number, 7);
    }

    #[tokio::test]
    async fn functional_in_memory_tracker_records_labels_on_known_issue() {
        let tracker = InMemoryIssueTracker::new().with_issue(issue_fixture(3, "t", "b", &[]));
        tracker.add_label(3, "ai-blocked").await.expect("label");
        tracker.add_label(3, "ai-blocked").await.expect("label");
        let issue = tracker.get_issue(3).await.expect("issue");
        assert_eq!(issue.label_names().collect::<Vec<_>>(), vec!["ai-blocked"]);
        assert_eq!(tracker.labels_added(3).len(), 2);
    }

    #[tokio::test]
    async fn functional_in_memory_tracker_numbers_new_pull_requests_after_issues() {
        let tracker = InMemoryIssueTracker::new().with_issue(issue_fixture(5, "t", "b", &[]));
        let pull = tracker
            .create_draft_pull_request(&DraftPullRequest {
                title: "AI (dry-run): Issue #5".to_string(),
                head: "ai/issue-5".to_string(),
                base: "main".to_string(),
                body: "body".to_string(),
            })
            .await
            .expect("create pull");
        assert_eq!(pull.number, 6);
        assert!(pull.draft);
        assert_eq!(tracker.pull_requests().len(), 1);
    }

    #[tokio::test]
    async fn regression_in_memory_tracker_missing_issue_reports_not_found() {
        let tracker = InMemoryIssueTracker::new();
        let error = tracker.get_issue(9).await.expect_err("missing issue");
        assert!(error.to_string().contains("404"));
    }
}
