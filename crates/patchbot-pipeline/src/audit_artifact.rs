use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use patchbot_core::{unix_ms_to_rfc3339, write_text_atomic};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const AUDIT_ARTIFACT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Record of one applied change, kept under `<state_dir>/artifacts`.
pub struct AuditArtifactRecord {
    pub schema_version: u32,
    pub run_id: String,
    pub repo: String,
    pub issue_number: u64,
    pub variant: String,
    pub branch: String,
    pub commit_sha: String,
    pub changed_paths: Vec<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub model: String,
    pub payload_sha256: String,
    pub created_unix_ms: u64,
    pub created_at: String,
}

impl AuditArtifactRecord {
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from("artifacts")
            .join(format!("issue-{}", self.issue_number))
            .join(format!("{}.json", sanitize_for_path(&self.run_id)))
    }
}

/// Writes `record` as pretty JSON and returns its absolute path.
pub fn write_audit_artifact(state_dir: &Path, record: &AuditArtifactRecord) -> Result<PathBuf> {
    let path = state_dir.join(record.relative_path());
    let mut payload =
        serde_json::to_string_pretty(record).context("failed to encode audit artifact")?;
    payload.push('\n');
    write_text_atomic(&path, &payload)
        .with_context(|| format!("failed to write audit artifact {}", path.display()))?;
    Ok(path)
}

pub fn rfc3339_timestamp(unix_ms: u64) -> String {
    unix_ms_to_rfc3339(unix_ms)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(output, "{byte:02x}");
    }
    output
}

fn sanitize_for_path(raw: &str) -> String {
    let sanitized = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let sanitized = sanitized.trim_matches('.');
    if sanitized.is_empty() {
        "run".to_string()
    } else {
        sanitized.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        sha256_hex, write_audit_artifact, AuditArtifactRecord, AUDIT_ARTIFACT_SCHEMA_VERSION,
    };

    fn record() -> AuditArtifactRecord {
        AuditArtifactRecord {
            schema_version: AUDIT_ARTIFACT_SCHEMA_VERSION,
            run_id: "apply-42-1760000000000".to_string(),
            repo: "octo/widgets".to_string(),
            issue_number: 42,
            variant: "file-set".to_string(),
            branch: "ai/issue-42".to_string(),
            commit_sha: "abc".to_string(),
            changed_paths: vec!["web/index.html".to_string()],
            summary: "Dark mode".to_string(),
            notes: None,
            model: "gpt-4.1-mini".to_string(),
            payload_sha256: sha256_hex(b"payload"),
            created_unix_ms: 1_760_000_000_000,
            created_at: "2025-10-09T08:53:20.000Z".to_string(),
        }
    }

    #[test]
    fn unit_sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn integration_write_audit_artifact_round_trips_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_audit_artifact(temp.path(), &record()).expect("write");
        assert_eq!(
            path,
            temp.path()
                .join("artifacts")
                .join("issue-42")
                .join("apply-42-1760000000000.json")
        );
        let raw = std::fs::read_to_string(&path).expect("read");
        let parsed: AuditArtifactRecord = serde_json::from_str(&raw).expect("decode");
        assert_eq!(parsed, record());
        assert!(!raw.contains("\"notes\""));
    }

    #[test]
    fn regression_run_ids_cannot_escape_artifact_directory() {
        let mut record = record();
        record.run_id = "../../escape".to_string();
        let relative = record.relative_path();
        assert!(relative
            .components()
            .all(|component| matches!(component, std::path::Component::Normal(_))));
    }
}
