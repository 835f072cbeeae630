//! Foundational low-level utilities shared across patchbot crates.
//!
//! Provides atomic state-file writes, wall-clock helpers, and the bounded text
//! excerpts used when model output or tool diagnostics are echoed back into
//! issue comments.

pub mod atomic_io;
pub mod text_utils;
pub mod time_utils;

pub use atomic_io::{read_text_if_exists, write_text_atomic};
pub use text_utils::{leading_lines_excerpt, strip_code_fences, truncate_for_error};
pub use time_utils::{current_unix_timestamp_ms, unix_ms_to_rfc3339};
