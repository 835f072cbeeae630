use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use patchbot_core::truncate_for_error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const GIT_ERROR_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of a dry-run patch application.
pub enum PatchCheck {
    Clean,
    /// The patch only applies in reverse: its changes are already present.
    AlreadyApplied,
    Conflict { diagnostic: String },
}

#[async_trait]
/// Version-control operations the pipeline performs on the checkout.
///
/// Paths are repository-relative with `/` separators.
pub trait WorkingTree: Send + Sync {
    async fn configure_identity(&self, name: &str, email: &str) -> Result<()>;

    /// Default branch as advertised by the remote.
    async fn default_branch(&self) -> Result<String>;

    async fn fetch_branch(&self, branch: &str) -> Result<()>;

    /// Checks out `branch` at its fetched remote head.
    async fn checkout_existing(&self, branch: &str) -> Result<()>;

    /// Creates or resets `branch` at the fetched head of `base`.
    async fn checkout_fresh(&self, branch: &str, base: &str) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<Option<String>>;

    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Tracked files at the current checkout.
    async fn list_files(&self) -> Result<Vec<String>>;

    async fn check_patch(&self, diff: &str) -> Result<PatchCheck>;

    async fn apply_patch(&self, diff: &str) -> Result<()>;

    /// Stages `paths` and returns the staged paths that differ from `HEAD`.
    async fn stage_paths(&self, paths: &[String]) -> Result<Vec<String>>;

    /// Commits the index and returns the new commit id.
    async fn commit(&self, message: &str) -> Result<String>;

    async fn push(&self, branch: &str, force: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
/// `WorkingTree` driving the `git` executable in a local checkout.
pub struct GitWorkingTree {
    root: PathBuf,
    remote: String,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitWorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run_git(&self, args: &[&str], stdin: Option<&str>) -> Result<GitOutput> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn git {}", args.join(" ")))?;
        if let Some(input) = stdin {
            let mut handle = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("git stdin was not captured"))?;
            handle
                .write_all(input.as_bytes())
                .await
                .context("failed to write git stdin")?;
            drop(handle);
        }
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed to wait for git {}", args.join(" ")))?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args, None).await?;
        if !output.success {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                truncate_for_error(output.stderr.trim(), GIT_ERROR_MAX_CHARS)
            );
        }
        Ok(output.stdout)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl WorkingTree for GitWorkingTree {
    async fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.git(&["config", "user.name", name]).await?;
        self.git(&["config", "user.email", email]).await?;
        Ok(())
    }

    async fn default_branch(&self) -> Result<String> {
        let shown = self.git(&["remote", "show", &self.remote]).await?;
        parse_remote_head_branch(&shown)
            .ok_or_else(|| anyhow!("remote '{}' did not report a HEAD branch", self.remote))
    }

    async fn fetch_branch(&self, branch: &str) -> Result<()> {
        self.git(&["fetch", &self.remote, branch]).await?;
        Ok(())
    }

    async fn checkout_existing(&self, branch: &str) -> Result<()> {
        let upstream = format!("{}/{}", self.remote, branch);
        self.git(&["checkout", "-B", branch, &upstream]).await?;
        Ok(())
    }

    async fn checkout_fresh(&self, branch: &str, base: &str) -> Result<()> {
        let upstream = format!("{}/{}", self.remote, base);
        self.git(&["checkout", "-B", branch, &upstream]).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("failed to read {}", full.display())),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&full, content)
            .await
            .with_context(|| format!("failed to write {}", full.display()))
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let listed = self.git(&["ls-files"]).await?;
        Ok(non_empty_lines(&listed))
    }

    async fn check_patch(&self, diff: &str) -> Result<PatchCheck> {
        let output = self
            .run_git(&["apply", "--check", "--whitespace=nowarn", "-"], Some(diff))
            .await?;
        if output.success {
            return Ok(PatchCheck::Clean);
        }
        let reverse = self
            .run_git(
                &["apply", "--check", "--reverse", "--whitespace=nowarn", "-"],
                Some(diff),
            )
            .await?;
        if reverse.success {
            return Ok(PatchCheck::AlreadyApplied);
        }
        Ok(PatchCheck::Conflict {
            diagnostic: output.stderr.trim().to_string(),
        })
    }

    async fn apply_patch(&self, diff: &str) -> Result<()> {
        let output = self
            .run_git(&["apply", "--whitespace=nowarn", "-"], Some(diff))
            .await?;
        if !output.success {
            bail!(
                "git apply failed: {}",
                truncate_for_error(output.stderr.trim(), GIT_ERROR_MAX_CHARS)
            );
        }
        Ok(())
    }

    async fn stage_paths(&self, paths: &[String]) -> Result<Vec<String>> {
        if !paths.is_empty() {
            let mut args = vec!["add", "-A", "--"];
            args.extend(paths.iter().map(String::as_str));
            self.git(&args).await?;
        }
        let staged = self.git(&["diff", "--cached", "--name-only"]).await?;
        Ok(non_empty_lines(&staged))
    }

    async fn commit(&self, message: &str) -> Result<String> {
        self.git(&["commit", "--no-verify", "-m", message]).await?;
        let head = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(head.trim().to_string())
    }

    async fn push(&self, branch: &str, force: bool) -> Result<()> {
        let mut args = vec!["push", "-u"];
        if force {
            args.push("--force");
        }
        args.push(&self.remote);
        args.push(branch);
        self.git(&args).await?;
        Ok(())
    }
}

/// Extracts `X` from the `HEAD branch: X` line of `git remote show`.
pub fn parse_remote_head_branch(shown: &str) -> Option<String> {
    shown
        .lines()
        .filter_map(|line| line.trim().strip_prefix("HEAD branch:"))
        .map(str::trim)
        .find(|branch| !branch.is_empty() && *branch != "(unknown)")
        .map(ToOwned::to_owned)
}

fn non_empty_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
