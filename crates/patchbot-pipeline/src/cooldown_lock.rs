use std::path::{Path, PathBuf};

use anyhow::Result;
use patchbot_core::{read_text_if_exists, write_text_atomic};

pub const DEFAULT_COOLDOWN_WINDOW_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Proceed,
    Throttled { remaining_ms: u64 },
}

#[derive(Debug, Clone)]
/// Per-issue timestamp files under `<state_dir>/locks`.
///
/// Each file holds the ASCII decimal millisecond time of the last
/// non-throttled apply attempt.
pub struct CooldownLock {
    locks_dir: PathBuf,
    window_ms: u64,
}

impl CooldownLock {
    pub fn new(state_dir: &Path, window_ms: u64) -> Self {
        Self {
            locks_dir: state_dir.join("locks"),
            window_ms,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn lock_path(&self, issue_number: u64) -> PathBuf {
        self.locks_dir.join(format!("issue-{issue_number}.lock"))
    }

    /// Last recorded attempt; unreadable contents count as no record.
    pub fn last_attempt_ms(&self, issue_number: u64) -> Result<Option<u64>> {
        let raw = read_text_if_exists(&self.lock_path(issue_number))?;
        Ok(raw.and_then(|raw| raw.trim().parse::<u64>().ok()))
    }

    pub fn should_throttle(&self, issue_number: u64, now_ms: u64) -> Result<bool> {
        Ok(matches!(
            self.evaluate(issue_number, now_ms)?,
            CooldownDecision::Throttled { .. }
        ))
    }

    pub fn record(&self, issue_number: u64, now_ms: u64) -> Result<()> {
        write_text_atomic(&self.lock_path(issue_number), &now_ms.to_string())
    }

    /// Reads the previous attempt and, unless throttled, records `now_ms`.
    pub fn check_and_record(&self, issue_number: u64, now_ms: u64) -> Result<CooldownDecision> {
        let decision = self.evaluate(issue_number, now_ms)?;
        if decision == CooldownDecision::Proceed {
            self.record(issue_number, now_ms)?;
        }
        Ok(decision)
    }

    fn evaluate(&self, issue_number: u64, now_ms: u64) -> Result<CooldownDecision> {
        let Some(last_ms) = self.last_attempt_ms(issue_number)? else {
            return Ok(CooldownDecision::Proceed);
        };
        let elapsed_ms = now_ms.saturating_sub(last_ms);
        if elapsed_ms < self.window_ms {
            return Ok(CooldownDecision::Throttled {
                remaining_ms: self.window_ms - elapsed_ms,
            });
        }
        Ok(CooldownDecision::Proceed)
    }
}
