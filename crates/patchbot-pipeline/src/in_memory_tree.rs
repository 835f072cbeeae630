use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::working_tree::{PatchCheck, WorkingTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha: String,
    pub branch: Option<String>,
    pub message: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub branch: String,
    pub force: bool,
}

#[derive(Debug)]
struct TreeState {
    head: BTreeMap<String, String>,
    working: BTreeMap<String, String>,
    staged: Vec<String>,
    default_branch: String,
    remote_branches: BTreeSet<String>,
    current_branch: Option<String>,
    identity: Option<(String, String)>,
    patch_conflict: Option<String>,
    commits: Vec<CommitRecord>,
    pushes: Vec<PushRecord>,
    operations: Vec<String>,
}

#[derive(Debug)]
/// Single-branch working tree held in memory.
///
/// `head` is the committed snapshot and `working` the checkout; staging
/// compares the two, so rewriting a file with identical content stages
/// nothing. `apply_patch` writes the post-image of each hunk as the full
/// file content, which is exact for diffs that cover whole files, and
/// `check_patch` reports a diff whose post-images are already in place as
/// applied.
pub struct InMemoryWorkingTree {
    state: Mutex<TreeState>,
}

impl Default for InMemoryWorkingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkingTree {
    pub fn new() -> Self {
        let mut remote_branches = BTreeSet::new();
        remote_branches.insert("main".to_string());
        Self {
            state: Mutex::new(TreeState {
                head: BTreeMap::new(),
                working: BTreeMap::new(),
                staged: Vec::new(),
                default_branch: "main".to_string(),
                remote_branches,
                current_branch: None,
                identity: None,
                patch_conflict: None,
                commits: Vec::new(),
                pushes: Vec::new(),
                operations: Vec::new(),
            }),
        }
    }

    /// Adds a committed file.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = self.lock();
            state.head.insert(path.to_string(), content.to_string());
            state.working.insert(path.to_string(), content.to_string());
        }
        self
    }

    pub fn with_remote_branch(self, branch: &str) -> Self {
        self.lock().remote_branches.insert(branch.to_string());
        self
    }

    pub fn with_patch_conflict(self, diagnostic: &str) -> Self {
        self.lock().patch_conflict = Some(diagnostic.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.lock().working.get(path).cloned()
    }

    pub fn commits(&self) -> Vec<CommitRecord> {
        self.lock().commits.clone()
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().pushes.clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    pub fn current_branch(&self) -> Option<String> {
        self.lock().current_branch.clone()
    }

    pub fn identity(&self) -> Option<(String, String)> {
        self.lock().identity.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WorkingTree for InMemoryWorkingTree {
    async fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        let mut state = self.lock();
        state.identity = Some((name.to_string(), email.to_string()));
        state.operations.push(format!("configure_identity {name}"));
        Ok(())
    }

    async fn default_branch(&self) -> Result<String> {
        Ok(self.lock().default_branch.clone())
    }

    async fn fetch_branch(&self, branch: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(format!("fetch {branch}"));
        if !state.remote_branches.contains(branch) {
            bail!("git fetch origin {branch} failed: couldn't find remote ref {branch}");
        }
        Ok(())
    }

    async fn checkout_existing(&self, branch: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(format!("checkout {branch}"));
        if !state.remote_branches.contains(branch) {
            bail!("git checkout {branch} failed: unknown branch");
        }
        state.current_branch = Some(branch.to_string());
        Ok(())
    }

    async fn checkout_fresh(&self, branch: &str, base: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(format!("checkout -B {branch} {base}"));
        if !state.remote_branches.contains(base) {
            bail!("git checkout -B {branch} origin/{base} failed: unknown base");
        }
        state.working = state.head.clone();
        state.staged.clear();
        state.current_branch = Some(branch.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        Ok(self.lock().working.get(path).cloned())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(format!("write {path}"));
        state.working.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.lock().head.keys().cloned().collect())
    }

    async fn check_patch(&self, diff: &str) -> Result<PatchCheck> {
        let mut state = self.lock();
        state.operations.push("apply --check".to_string());
        if let Some(diagnostic) = &state.patch_conflict {
            return Ok(PatchCheck::Conflict {
                diagnostic: diagnostic.clone(),
            });
        }
        let images = post_images(diff);
        let already_applied = !images.is_empty()
            && images
                .iter()
                .all(|(path, image)| state.working.get(path) == image.as_ref());
        Ok(if already_applied {
            PatchCheck::AlreadyApplied
        } else {
            PatchCheck::Clean
        })
    }

    async fn apply_patch(&self, diff: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push("apply".to_string());
        if let Some(diagnostic) = state.patch_conflict.clone() {
            bail!("git apply failed: {diagnostic}");
        }
        for (path, post_image) in post_images(diff) {
            match post_image {
                Some(content) => {
                    state.working.insert(path, content);
                }
                None => {
                    state.working.remove(&path);
                }
            }
        }
        Ok(())
    }

    async fn stage_paths(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.operations.push(format!("add {}", paths.join(" ")));
        for path in paths {
            let changed = state.working.get(path) != state.head.get(path);
            if changed && !state.staged.contains(path) {
                state.staged.push(path.clone());
            }
        }
        let mut staged = state.staged.clone();
        staged.sort();
        Ok(staged)
    }

    async fn commit(&self, message: &str) -> Result<String> {
        let mut state = self.lock();
        if state.staged.is_empty() {
            bail!("git commit failed: nothing to commit, working tree clean");
        }
        let paths = std::mem::take(&mut state.staged);
        for path in &paths {
            let content = state.working.get(path).cloned();
            match content {
                Some(content) => {
                    state.head.insert(path.clone(), content);
                }
                None => {
                    state.head.remove(path);
                }
            }
        }
        let sha = format!("{:040x}", state.commits.len() + 1);
        let branch = state.current_branch.clone();
        state.commits.push(CommitRecord {
            sha: sha.clone(),
            branch,
            message: message.to_string(),
            paths,
        });
        state.operations.push(format!("commit {sha}"));
        Ok(sha)
    }

    async fn push(&self, branch: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        if state.current_branch.as_deref() != Some(branch) {
            return Err(anyhow!(
                "git push origin {branch} failed: src refspec {branch} does not match any"
            ));
        }
        state.remote_branches.insert(branch.to_string());
        state.pushes.push(PushRecord {
            branch: branch.to_string(),
            force,
        });
        state.operations.push(format!("push {branch}"));
        Ok(())
    }
}

/// Target path and post-image (`None` for deletions) of each file section.
fn post_images(diff: &str) -> Vec<(String, Option<String>)> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Option<Vec<String>>)> = None;
    let mut source_path = String::new();
    let mut in_hunk = false;
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            sections.extend(current.take());
            source_path.clear();
            in_hunk = false;
            continue;
        }
        if !in_hunk {
            if let Some(source) = line.strip_prefix("--- ") {
                let source = header_path(source);
                source_path = source.strip_prefix("a/").unwrap_or(source).to_string();
                continue;
            }
            if let Some(target) = line.strip_prefix("+++ ") {
                let target = header_path(target);
                current = Some(if target == "/dev/null" {
                    (source_path.clone(), None)
                } else {
                    let path = target.strip_prefix("b/").unwrap_or(target).to_string();
                    (path, Some(Vec::new()))
                });
                continue;
            }
        }
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if !in_hunk {
            continue;
        }
        if let Some((_, Some(lines))) = current.as_mut() {
            if let Some(kept) = line.strip_prefix('+').or_else(|| line.strip_prefix(' ')) {
                lines.push(kept.to_string());
            }
        }
    }
    sections.extend(current.take());
    sections
        .into_iter()
        .filter(|(path, _)| !path.is_empty() && path != "/dev/null")
        .map(|(path, lines)| {
            let content = lines.map(|lines| {
                let mut content = lines.join("\n");
                content.push('\n');
                content
            });
            (path, content)
        })
        .collect()
}

fn header_path(header: &str) -> &str {
    header.split('\t').next().unwrap_or_default().trim()
}
