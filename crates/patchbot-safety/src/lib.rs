//! Path and content safety checks applied to model-proposed changes.
//!
//! `PathPolicy` classifies every touched path before anything is written,
//! `ProseFilter` flags conversational filler in text that should be a bare
//! unified diff, and `policy_config` loads operator overrides from TOML.

pub mod path_policy;
pub mod policy_config;
pub mod prose_filter;

pub use path_policy::{
    AllowRule, PathPolicy, PathPolicyDecision, DEFAULT_ALLOW_PREFIXES, DEFAULT_DENY_FILE_PATTERNS,
    DEFAULT_DENY_PREFIXES, DEFAULT_DENY_SEGMENTS, DEFAULT_LOCK_FILE_NAMES,
};
pub use policy_config::{load_path_policy_file, PathPolicyFile};
pub use prose_filter::{ProseFilter, ProseMatch, DEFAULT_PROSE_PHRASES};
