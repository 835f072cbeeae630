use anyhow::Result;
use async_trait::async_trait;

use crate::run_config::ChangeVariant;
use crate::working_tree::{PatchCheck, WorkingTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Full-content rewrites of explicitly listed files.
pub struct FileSetChange {
    pub files: Vec<FileWrite>,
    pub summary: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Unified diff plus every path it touches, old and new sides included.
pub struct DiffChange {
    pub diff: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Validated, not yet applied, model output.
pub enum CandidateChange {
    Diff(DiffChange),
    FileSet(FileSetChange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeApplication {
    Applied,
    /// Every change was already present; nothing was written.
    AlreadyApplied,
    /// The tree was left untouched; `diagnostic` is the tool output.
    Conflict { diagnostic: String },
}

#[async_trait]
/// Materializes a change in a working tree.
pub trait ChangeApplier: Send + Sync {
    fn touched_paths(&self) -> Vec<String>;

    async fn apply(&self, tree: &dyn WorkingTree) -> Result<ChangeApplication>;
}

#[async_trait]
impl ChangeApplier for FileSetChange {
    fn touched_paths(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.files.len());
        for file in &self.files {
            if !paths.contains(&file.path) {
                paths.push(file.path.clone());
            }
        }
        paths
    }

    async fn apply(&self, tree: &dyn WorkingTree) -> Result<ChangeApplication> {
        for file in &self.files {
            tree.write_file(&file.path, &file.content).await?;
        }
        Ok(ChangeApplication::Applied)
    }
}

#[async_trait]
impl ChangeApplier for DiffChange {
    fn touched_paths(&self) -> Vec<String> {
        self.paths.clone()
    }

    async fn apply(&self, tree: &dyn WorkingTree) -> Result<ChangeApplication> {
        match tree.check_patch(&self.diff).await? {
            PatchCheck::Clean => {}
            PatchCheck::AlreadyApplied => return Ok(ChangeApplication::AlreadyApplied),
            PatchCheck::Conflict { diagnostic } => {
                return Ok(ChangeApplication::Conflict { diagnostic })
            }
        }
        tree.apply_patch(&self.diff).await?;
        Ok(ChangeApplication::Applied)
    }
}

#[async_trait]
impl ChangeApplier for CandidateChange {
    fn touched_paths(&self) -> Vec<String> {
        match self {
            Self::Diff(change) => change.touched_paths(),
            Self::FileSet(change) => change.touched_paths(),
        }
    }

    async fn apply(&self, tree: &dyn WorkingTree) -> Result<ChangeApplication> {
        match self {
            Self::Diff(change) => change.apply(tree).await,
            Self::FileSet(change) => change.apply(tree).await,
        }
    }
}

impl CandidateChange {
    pub fn variant(&self) -> ChangeVariant {
        match self {
            Self::Diff(_) => ChangeVariant::Diff,
            Self::FileSet(_) => ChangeVariant::FileSet,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Diff(_) => None,
            Self::FileSet(change) => Some(change.summary.as_str()),
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Self::Diff(_) => None,
            Self::FileSet(change) => change.notes.as_deref(),
        }
    }

    /// Canonical bytes of the change, used for the audit checksum.
    pub fn payload(&self) -> String {
        match self {
            Self::Diff(change) => change.diff.clone(),
            Self::FileSet(change) => change
                .files
                .iter()
                .map(|file| format!("{}\n{}", file.path, file.content))
                .collect::<Vec<_>>()
                .join("\n\0\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CandidateChange, ChangeApplication, ChangeApplier, DiffChange, FileSetChange, FileWrite,
    };
    use crate::in_memory_tree::InMemoryWorkingTree;
    use crate::run_config::ChangeVariant;
    use crate::working_tree::WorkingTree;

    fn file_set() -> FileSetChange {
        FileSetChange {
            files: vec![
                FileWrite {
                    path: "web/index.html".to_string(),
                    content: "<html>v1</html>".to_string(),
                },
                FileWrite {
                    path: "web/index.html".to_string(),
                    content: "<html>v2</html>".to_string(),
                },
            ],
            summary: "Update page".to_string(),
            notes: None,
        }
    }

    #[test]
    fn unit_file_set_touched_paths_are_deduplicated() {
        assert_eq!(file_set().touched_paths(), vec!["web/index.html".to_string()]);
    }

    #[tokio::test]
    async fn functional_file_set_apply_writes_in_order() {
        let tree = InMemoryWorkingTree::new();
        let change = CandidateChange::FileSet(file_set());
        assert_eq!(change.variant(), ChangeVariant::FileSet);
        assert_eq!(
            change.apply(&tree).await.expect("apply"),
            ChangeApplication::Applied
        );
        assert_eq!(
            tree.read_file("web/index.html").await.expect("read"),
            Some("<html>v2</html>".to_string())
        );
    }

    #[tokio::test]
    async fn regression_diff_already_present_in_tree_is_not_reapplied() {
        let tree = InMemoryWorkingTree::new().with_file("web/app.js", "b\n");
        let change = DiffChange {
            diff: "diff --git a/web/app.js b/web/app.js\n--- a/web/app.js\n+++ b/web/app.js\n@@ -1 +1 @@\n-a\n+b\n".to_string(),
            paths: vec!["web/app.js".to_string()],
        };
        assert_eq!(
            change.apply(&tree).await.expect("apply"),
            ChangeApplication::AlreadyApplied
        );
        assert!(!tree.operations().contains(&"apply".to_string()));
    }

    #[test]
    fn regression_payload_differs_between_file_sets() {
        let first = CandidateChange::FileSet(file_set());
        let mut other = file_set();
        other.files[1].content = "<html>v3</html>".to_string();
        let second = CandidateChange::FileSet(other);
        assert_ne!(first.payload(), second.payload());
    }
}
