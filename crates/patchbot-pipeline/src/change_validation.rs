use patchbot_core::strip_code_fences;
use patchbot_safety::ProseFilter;
use serde_json::Value;
use thiserror::Error;

use crate::change::{CandidateChange, DiffChange, FileSetChange, FileWrite};
use crate::run_config::ChangeVariant;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
/// Why model output was rejected before touching the working tree.
pub enum ChangeValidationError {
    #[error("AI response was empty.")]
    Empty,
    #[error("AI response was not valid JSON.")]
    InvalidJson,
    #[error("AI response JSON was not an object.")]
    NotAnObject,
    #[error("AI response contained no files to write.")]
    NoFiles,
    #[error("AI response had a malformed file entry at position {index}.")]
    MalformedFileEntry { index: usize },
    #[error("AI response contained an unsafe file path.")]
    NonStringPath { index: usize },
    #[error("AI response had non-string content for {path}.")]
    NonStringContent { path: String },
    #[error("AI response had a non-string summary.")]
    NonStringSummary,
    #[error("AI response is {size} bytes, above the {limit} byte diff limit.")]
    DiffTooLarge { size: usize, limit: usize },
    #[error("AI response contained conversational text (\"{phrase}\") instead of a bare diff.")]
    ProseDetected { phrase: String },
    #[error("AI response did not contain a `diff --git` header.")]
    MissingDiffHeader,
    #[error("AI response diff is missing `---`/`+++` file headers.")]
    MissingFileHeaders,
    #[error("AI response diff names {path} without an `a/` or `b/` prefix.")]
    UnprefixedDiffPath { path: String },
}

impl ChangeValidationError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_response",
            Self::InvalidJson => "invalid_json",
            Self::NotAnObject => "json_not_object",
            Self::NoFiles => "no_files",
            Self::MalformedFileEntry { .. } => "malformed_file_entry",
            Self::NonStringPath { .. } => "missing_file_path",
            Self::NonStringContent { .. } => "non_string_content",
            Self::NonStringSummary => "non_string_summary",
            Self::DiffTooLarge { .. } => "diff_too_large",
            Self::ProseDetected { .. } => "prose_detected",
            Self::MissingDiffHeader => "missing_diff_header",
            Self::MissingFileHeaders => "missing_file_headers",
            Self::UnprefixedDiffPath { .. } => "unprefixed_diff_path",
        }
    }
}

/// Validates raw text according to the configured change variant.
pub fn validate_candidate_change(
    variant: ChangeVariant,
    raw: &str,
    prose_filter: &ProseFilter,
    max_diff_bytes: usize,
    default_summary: &str,
) -> Result<CandidateChange, ChangeValidationError> {
    match variant {
        ChangeVariant::FileSet => {
            validate_file_set_change(raw, default_summary).map(CandidateChange::FileSet)
        }
        ChangeVariant::Diff => {
            validate_diff_change(raw, prose_filter, max_diff_bytes).map(CandidateChange::Diff)
        }
    }
}

/// Parses `{"files":[{"path","content"}], "summary"?, "notes"?}`.
///
/// A single bad entry rejects the whole batch.
pub fn validate_file_set_change(
    raw: &str,
    default_summary: &str,
) -> Result<FileSetChange, ChangeValidationError> {
    let stripped = strip_code_fences(raw);
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return Err(ChangeValidationError::Empty);
    }
    let parsed: Value =
        serde_json::from_str(stripped).map_err(|_| ChangeValidationError::InvalidJson)?;
    let object = parsed
        .as_object()
        .ok_or(ChangeValidationError::NotAnObject)?;

    let entries = match object.get("files") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err(ChangeValidationError::NoFiles),
    };
    let mut files = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let entry = entry
            .as_object()
            .ok_or(ChangeValidationError::MalformedFileEntry { index })?;
        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .ok_or(ChangeValidationError::NonStringPath { index })?;
        let content = entry.get("content").and_then(Value::as_str).ok_or_else(|| {
            ChangeValidationError::NonStringContent {
                path: path.to_string(),
            }
        })?;
        files.push(FileWrite {
            path: path.to_string(),
            content: content.to_string(),
        });
    }

    let summary = match object.get("summary") {
        None | Some(Value::Null) => None,
        Some(Value::String(summary)) => Some(summary.trim()),
        Some(_) => return Err(ChangeValidationError::NonStringSummary),
    }
    .filter(|summary| !summary.is_empty())
    .unwrap_or(default_summary)
    .to_string();
    let notes = object
        .get("notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|notes| !notes.is_empty())
        .map(ToOwned::to_owned);

    Ok(FileSetChange {
        files,
        summary,
        notes,
    })
}

/// Checks that `raw` is a bare unified diff and extracts its paths.
pub fn validate_diff_change(
    raw: &str,
    prose_filter: &ProseFilter,
    max_diff_bytes: usize,
) -> Result<DiffChange, ChangeValidationError> {
    let stripped = strip_code_fences(raw);
    if stripped.trim().is_empty() {
        return Err(ChangeValidationError::Empty);
    }
    if stripped.len() > max_diff_bytes {
        return Err(ChangeValidationError::DiffTooLarge {
            size: stripped.len(),
            limit: max_diff_bytes,
        });
    }
    if let Some(found) = prose_filter.find_in_diff(&stripped) {
        return Err(ChangeValidationError::ProseDetected {
            phrase: found.phrase,
        });
    }

    let lines = stripped.lines().collect::<Vec<_>>();
    let start = lines
        .iter()
        .position(|line| line.starts_with("diff --git "))
        .ok_or(ChangeValidationError::MissingDiffHeader)?;
    let body = &lines[start..];
    let has_old_header = body.iter().any(|line| line.starts_with("--- "));
    let has_new_header = body.iter().any(|line| line.starts_with("+++ "));
    if !has_old_header || !has_new_header {
        return Err(ChangeValidationError::MissingFileHeaders);
    }

    let mut diff = body.join("\n");
    diff.push('\n');
    let paths = parse_diff_paths(&diff)?;
    if paths.is_empty() {
        return Err(ChangeValidationError::MissingFileHeaders);
    }
    Ok(DiffChange { diff, paths })
}

/// Every path named by a diff, in first-seen order, as `git apply` writes it.
///
/// `git apply` strips the first component of header paths, so every
/// `diff --git` and `---`/`+++` path must carry an `a/` or `b/` prefix and
/// anything else is rejected. Rename and copy lines name repository paths
/// directly and are taken as-is. `/dev/null` is skipped.
pub fn parse_diff_paths(diff: &str) -> Result<Vec<String>, ChangeValidationError> {
    let lines = diff.lines().collect::<Vec<_>>();
    let mut paths = Vec::new();
    let mut push = |path: &str| {
        if !paths.iter().any(|known: &String| known == path) {
            paths.push(path.to_string());
        }
    };
    for (index, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let (old, new) =
                split_git_header(rest).ok_or_else(|| ChangeValidationError::UnprefixedDiffPath {
                    path: rest.trim().to_string(),
                })?;
            for side in [old, new] {
                if let Some(path) = strip_side_prefix(side)? {
                    push(path);
                }
            }
            continue;
        }
        // `--- `/`+++ ` only count as a header pair, never as hunk lines.
        let next = lines.get(index + 1).copied().unwrap_or_default();
        let previous = index
            .checked_sub(1)
            .and_then(|previous| lines.get(previous))
            .copied()
            .unwrap_or_default();
        let header = if let Some(rest) = line.strip_prefix("--- ") {
            next.starts_with("+++ ").then_some(rest)
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            previous.starts_with("--- ").then_some(rest)
        } else {
            None
        };
        if let Some(rest) = header {
            if let Some(path) = strip_side_prefix(strip_timestamp(rest))? {
                push(path);
            }
        } else if let Some(rest) = ["rename from ", "rename to ", "copy from ", "copy to "]
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
        {
            let path = rest.trim().trim_matches('"');
            if !path.is_empty() {
                push(path);
            }
        }
    }
    Ok(paths)
}

fn strip_timestamp(header: &str) -> &str {
    header.split('\t').next().unwrap_or_default()
}

/// Splits `a/x b/x` (or its quoted form) into both prefixed sides.
fn split_git_header(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim();
    if rest.starts_with('"') {
        let split = rest[1..].find("\" ")? + 2;
        return Some((&rest[..split], &rest[split + 1..]));
    }
    let split = rest.find(" b/")?;
    Some((&rest[..split], &rest[split + 1..]))
}

fn strip_side_prefix(raw: &str) -> Result<Option<&str>, ChangeValidationError> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() || trimmed == "/dev/null" {
        return Ok(None);
    }
    trimmed
        .strip_prefix("a/")
        .or_else(|| trimmed.strip_prefix("b/"))
        .filter(|path| !path.is_empty())
        .map(Some)
        .ok_or_else(|| ChangeValidationError::UnprefixedDiffPath {
            path: trimmed.to_string(),
        })
}
