use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::{Context, Result};

/// Conversational phrases that mark model output as chat rather than a patch.
pub const DEFAULT_PROSE_PHRASES: &[&str] = &[
    "here is",
    "here's",
    "here\u{2019}s",
    "sure",
    "explanation:",
];

const DIFF_LINE_PREFIXES: &[&str] = &[
    "diff --git ",
    "index ",
    "--- ",
    "+++ ",
    "@@",
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "similarity index",
    "dissimilarity index",
    "rename from",
    "rename to",
    "copy from",
    "copy to",
    "Binary files",
    "\\ No newline",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProseMatch {
    pub phrase: String,
    /// 1-based line number in the scanned text.
    pub line: usize,
}

#[derive(Debug, Clone)]
/// Word-bounded, ASCII case-insensitive phrase matcher.
///
/// Only prose is scanned: text before the first `diff --git` header and
/// lines that are not part of diff syntax. Hunk bodies are skipped for as
/// many lines as their `@@` header announces, so a patch that edits source
/// containing "sure" or "here is" still passes while commentary after the
/// last hunk does not.
pub struct ProseFilter {
    matcher: AhoCorasick,
    phrases: Vec<String>,
}

impl ProseFilter {
    pub fn new<I, S>(phrases: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|phrase| phrase.as_ref().trim().to_string())
            .filter(|phrase| !phrase.is_empty())
            .collect::<Vec<_>>();
        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&phrases)
            .context("failed to build prose phrase matcher")?;
        Ok(Self { matcher, phrases })
    }

    pub fn with_default_phrases() -> Result<Self> {
        Self::new(DEFAULT_PROSE_PHRASES)
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// First word-bounded phrase found anywhere in `text`.
    pub fn find_in_text(&self, text: &str) -> Option<String> {
        self.matcher
            .find_overlapping_iter(text)
            .find(|found| is_word_bounded(text, found.start(), found.end()))
            .map(|found| self.phrases[found.pattern().as_usize()].clone())
    }

    /// First prose phrase in a candidate diff, skipping diff body lines.
    pub fn find_in_diff(&self, diff_text: &str) -> Option<ProseMatch> {
        let mut in_diff = false;
        let mut hunk: Option<HunkBudget> = None;
        for (index, line) in diff_text.lines().enumerate() {
            if line.starts_with("diff --git ") {
                in_diff = true;
                hunk = None;
                continue;
            }
            if in_diff {
                if let Some(budget) = hunk.as_mut() {
                    if budget.consume(line) {
                        if budget.is_spent() {
                            hunk = None;
                        }
                        continue;
                    }
                    hunk = None;
                }
                if line.starts_with("@@") {
                    hunk = Some(HunkBudget::parse(line)).filter(|budget| !budget.is_spent());
                    continue;
                }
                if is_diff_header_line(line) {
                    continue;
                }
            }
            if let Some(phrase) = self.find_in_text(line) {
                return Some(ProseMatch {
                    phrase,
                    line: index + 1,
                });
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
/// Old and new side lines a hunk still owes after its `@@` header.
struct HunkBudget {
    old: usize,
    new: usize,
}

impl HunkBudget {
    /// Falls back to an unbounded hunk when the header has no usable ranges.
    fn parse(header: &str) -> Self {
        let mut ranges = header.trim_start_matches('@').split_whitespace();
        let old = ranges
            .next()
            .and_then(|range| range.strip_prefix('-'))
            .and_then(range_len);
        let new = ranges
            .next()
            .and_then(|range| range.strip_prefix('+'))
            .and_then(range_len);
        match (old, new) {
            (Some(old), Some(new)) => Self { old, new },
            _ => Self {
                old: usize::MAX,
                new: usize::MAX,
            },
        }
    }

    /// Counts `line` against the hunk; `false` when it cannot belong to it.
    fn consume(&mut self, line: &str) -> bool {
        if line.starts_with('\\') {
            return true;
        }
        if line.is_empty() || line.starts_with(' ') {
            if self.old == 0 || self.new == 0 {
                return false;
            }
            self.old -= 1;
            self.new -= 1;
            return true;
        }
        if line.starts_with('-') && self.old > 0 {
            self.old -= 1;
            return true;
        }
        if line.starts_with('+') && self.new > 0 {
            self.new -= 1;
            return true;
        }
        false
    }

    fn is_spent(&self) -> bool {
        self.old == 0 && self.new == 0
    }
}

fn range_len(range: &str) -> Option<usize> {
    match range.split_once(',') {
        Some((start, len)) => start.parse::<usize>().ok().and(len.parse().ok()),
        None => range.parse::<usize>().ok().map(|_| 1),
    }
}

fn is_diff_header_line(line: &str) -> bool {
    line.trim().is_empty()
        || DIFF_LINE_PREFIXES
            .iter()
            .any(|prefix| line.starts_with(prefix))
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let starts_clean = before.map_or(true, |ch| !ch.is_alphanumeric());
    let ends_clean = after.map_or(true, |ch| !ch.is_alphanumeric());
    starts_clean && ends_clean
}
