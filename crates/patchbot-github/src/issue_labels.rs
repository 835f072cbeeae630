/// Normalizes a label for case-insensitive comparison.
pub fn normalize_issue_label(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Returns true when any of `labels` matches `wanted` after normalization.
pub fn issue_has_label<'a>(labels: impl IntoIterator<Item = &'a str>, wanted: &str) -> bool {
    let wanted = normalize_issue_label(wanted);
    if wanted.is_empty() {
        return false;
    }
    labels
        .into_iter()
        .any(|label| normalize_issue_label(label) == wanted)
}

#[cfg(test)]
mod tests {
    use super::{issue_has_label, normalize_issue_label};

    #[test]
    fn unit_normalize_issue_label_trims_and_lowercases() {
        assert_eq!(normalize_issue_label("  AI-Processed "), "ai-processed");
    }

    #[test]
    fn functional_issue_has_label_matches_case_insensitively() {
        assert!(issue_has_label(["bug", "AI-processed"], "ai-processed"));
        assert!(!issue_has_label(["bug"], "ai-processed"));
    }

    #[test]
    fn regression_issue_has_label_never_matches_blank_label() {
        assert!(!issue_has_label(["", "  "], " "));
    }
}
