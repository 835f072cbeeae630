use anyhow::{Context, Result};
use patchbot_github::{issue_has_label, GithubIssue, IssueTracker};

use crate::run_config::RunConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Issue metadata fetched once per invocation.
pub struct IssueContext {
    pub repo: String,
    pub issue_number: u64,
    pub actor: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl IssueContext {
    pub async fn fetch(tracker: &dyn IssueTracker, config: &RunConfig) -> Result<Self> {
        let issue = tracker
            .get_issue(config.issue_number)
            .await
            .with_context(|| format!("failed to load issue #{}", config.issue_number))?;
        Ok(Self::from_issue(config, &issue))
    }

    pub fn from_issue(config: &RunConfig, issue: &GithubIssue) -> Self {
        Self {
            repo: config.repo.as_slug(),
            issue_number: issue.number,
            actor: config.actor.clone(),
            title: issue.title.clone(),
            body: issue.body.clone().unwrap_or_default(),
            labels: issue.label_names().map(ToOwned::to_owned).collect(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        issue_has_label(self.labels.iter().map(String::as_str), label)
    }

    /// Title and body, searched for lock-file names the issue asks to touch.
    pub fn issue_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}
