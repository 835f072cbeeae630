use patchbot_ai::{CompletionClient, CompletionError, CompletionRequest};

use crate::issue_context::IssueContext;
use crate::run_config::ChangeVariant;

const FILE_SET_INSTRUCTIONS: &[&str] = &[
    "You are an AI coding assistant working on a single repository file.",
    "Return ONLY valid JSON. No markdown, no code fences, no explanations.",
    "JSON schema:",
    "{",
    "  \"files\": [",
    "    { \"path\": \"<allowed path>\", \"content\": \"<full file content as string>\" }",
    "  ],",
    "  \"summary\": \"short summary\",",
    "  \"notes\": \"optional\"",
    "}",
];

const DIFF_INSTRUCTIONS: &[&str] = &[
    "You are an AI coding assistant working on a repository.",
    "Return ONLY a unified diff in `git diff` format, starting with a `diff --git` line.",
    "Every file section needs `--- a/<path>` and `+++ b/<path>` headers.",
    "No markdown, no code fences, no commentary before or after the diff.",
    "Only touch paths from the repository listing below.",
];

#[derive(Debug, Clone, Copy)]
/// Repository material embedded after the issue text.
pub enum PromptMaterial<'a> {
    /// Allowlisted repository paths, for diff output.
    RepositoryListing(&'a [String]),
    /// The single writable file and its current content, for JSON output.
    TargetFile { path: &'a str, content: &'a str },
}

/// Deterministic prompt: instruction header, issue text, then material.
pub fn build_change_prompt(issue: &IssueContext, material: PromptMaterial<'_>) -> String {
    let mut lines = Vec::new();
    match material {
        PromptMaterial::TargetFile { path, .. } => {
            lines.extend(FILE_SET_INSTRUCTIONS.iter().map(|line| (*line).to_string()));
            lines.push(String::new());
            lines.push(format!("Allowed paths: {path} only."));
        }
        PromptMaterial::RepositoryListing(_) => {
            lines.extend(DIFF_INSTRUCTIONS.iter().map(|line| (*line).to_string()));
        }
    }
    lines.push(String::new());
    lines.push(format!("Issue title: {}", issue.title));
    lines.push("Issue body:".to_string());
    lines.push(if issue.body.trim().is_empty() {
        "(empty)".to_string()
    } else {
        issue.body.clone()
    });
    lines.push(String::new());
    match material {
        PromptMaterial::TargetFile { path, content } => {
            lines.push(format!("Current {path}:"));
            lines.push("-----".to_string());
            lines.push(content.to_string());
            lines.push("-----".to_string());
        }
        PromptMaterial::RepositoryListing(paths) => {
            lines.push("Repository files:".to_string());
            lines.extend(paths.iter().cloned());
        }
    }
    lines.join("\n")
}

/// Single completion call; the file-set variant requests JSON output.
pub async fn request_change(
    client: &dyn CompletionClient,
    model: &str,
    variant: ChangeVariant,
    prompt: String,
) -> Result<String, CompletionError> {
    let request = CompletionRequest {
        model: model.to_string(),
        input: prompt,
        temperature: 0.0,
        json_mode: variant == ChangeVariant::FileSet,
    };
    let response = client.complete(request).await?;
    tracing::info!(
        variant = variant.as_str(),
        output_chars = response.text.chars().count(),
        total_tokens = response.usage.total_tokens,
        "completion received"
    );
    Ok(response.text)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use patchbot_ai::{
        CompletionClient, CompletionError, CompletionRequest, CompletionResponse, CompletionUsage,
    };

    use super::{build_change_prompt, request_change, PromptMaterial};
    use crate::issue_context::IssueContext;
    use crate::run_config::ChangeVariant;

    struct RecordingClient {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            self.requests.lock().expect("requests lock").push(request);
            Ok(CompletionResponse {
                text: "{\"files\":[]}".to_string(),
                status: Some("completed".to_string()),
                usage: CompletionUsage::default(),
            })
        }
    }

    fn issue(body: &str) -> IssueContext {
        IssueContext {
            repo: "octo/widgets".to_string(),
            issue_number: 42,
            actor: "alice".to_string(),
            title: "Add dark mode".to_string(),
            body: body.to_string(),
            labels: Vec::new(),
        }
    }

    #[test]
    fn unit_file_set_prompt_embeds_target_between_fences() {
        let prompt = build_change_prompt(
            &issue("Please add a toggle."),
            PromptMaterial::TargetFile {
                path: "web/index.html",
                content: "<html></html>",
            },
        );
        assert!(prompt.starts_with("You are an AI coding assistant"));
        assert!(prompt.contains("Allowed paths: web/index.html only."));
        assert!(prompt.contains("Issue title: Add dark mode\nIssue body:\nPlease add a toggle."));
        assert!(prompt.ends_with("Current web/index.html:\n-----\n<html></html>\n-----"));
    }

    #[test]
    fn functional_diff_prompt_lists_repository_paths() {
        let listing = vec!["src/main.rs".to_string(), "web/index.html".to_string()];
        let prompt = build_change_prompt(&issue("  "), PromptMaterial::RepositoryListing(&listing));
        assert!(prompt.contains("diff --git"));
        assert!(prompt.contains("Issue body:\n(empty)"));
        assert!(prompt.ends_with("Repository files:\nsrc/main.rs\nweb/index.html"));
    }

    #[test]
    fn regression_prompt_is_deterministic() {
        let listing = vec!["docs/a.md".to_string()];
        let first = build_change_prompt(&issue("x"), PromptMaterial::RepositoryListing(&listing));
        let second = build_change_prompt(&issue("x"), PromptMaterial::RepositoryListing(&listing));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn functional_request_change_sets_json_mode_for_file_set_only() {
        let client = RecordingClient {
            requests: Mutex::new(Vec::new()),
        };
        let text = request_change(&client, "gpt-4.1-mini", ChangeVariant::FileSet, "p".into())
            .await
            .expect("file-set");
        assert_eq!(text, "{\"files\":[]}");
        request_change(&client, "gpt-4.1-mini", ChangeVariant::Diff, "p".into())
            .await
            .expect("diff");

        let requests = client.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 2);
        assert!(requests[0].json_mode);
        assert!(!requests[1].json_mode);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].model, "gpt-4.1-mini");
    }
}
