//! Issue-triggered AI change pipeline.
//!
//! A comment on an issue is parsed into a `TriggerCommand`. `/ai` bootstraps
//! the issue branch and a draft pull request (`dry_run`); `/ai apply` asks the
//! completion backend for a change, validates it, gates every touched path
//! through the `PathPolicy`, and commits and pushes it (`apply_runner`).
//! Every anticipated stop is reported back on the issue.

pub mod apply_runner;
pub mod audit_artifact;
pub mod change;
pub mod change_validation;
pub mod cooldown_lock;
pub mod dispatch;
pub mod dry_run;
pub mod in_memory_tree;
pub mod issue_comments;
pub mod issue_context;
pub mod patch_request;
pub mod run_config;
pub mod trigger_command;
pub mod working_tree;

pub use apply_runner::{run_apply, ApplyFailure, ApplyOutcome, ApplyReport, ApplyStage};
pub use audit_artifact::{write_audit_artifact, AuditArtifactRecord};
pub use change::{
    CandidateChange, ChangeApplication, ChangeApplier, DiffChange, FileSetChange, FileWrite,
};
pub use change_validation::{
    parse_diff_paths, validate_candidate_change, validate_diff_change, validate_file_set_change,
    ChangeValidationError,
};
pub use cooldown_lock::{CooldownDecision, CooldownLock, DEFAULT_COOLDOWN_WINDOW_MS};
pub use dispatch::{run_trigger, run_trigger_at, PipelineServices, RunOutcome};
pub use dry_run::{run_dry_run, DryRunOutcome, DryRunReport};
pub use in_memory_tree::{CommitRecord, InMemoryWorkingTree, PushRecord};
pub use issue_context::IssueContext;
pub use patch_request::{build_change_prompt, request_change, PromptMaterial};
pub use run_config::{ChangeVariant, RunConfig, RunConfigError, RunConfigInputs};
pub use trigger_command::{parse_trigger_command, TriggerCommand};
pub use working_tree::{GitWorkingTree, PatchCheck, WorkingTree};
