#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Intent parsed from an issue comment.
pub enum TriggerCommand {
    None,
    DryRun,
    Apply,
}

impl TriggerCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DryRun => "dry_run",
            Self::Apply => "apply",
        }
    }
}

/// Parses `/ai` and `/ai apply`; every other comment is `None`.
///
/// Matching is on whitespace-separated tokens and is case-sensitive.
pub fn parse_trigger_command(raw: &str) -> TriggerCommand {
    let mut tokens = raw.split_whitespace();
    if tokens.next() != Some("/ai") {
        return TriggerCommand::None;
    }
    match (tokens.next(), tokens.next()) {
        (None, _) => TriggerCommand::DryRun,
        (Some("apply"), None) => TriggerCommand::Apply,
        _ => TriggerCommand::None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_trigger_command, TriggerCommand};

    #[test]
    fn unit_parse_trigger_command_recognizes_both_triggers() {
        assert_eq!(parse_trigger_command("/ai"), TriggerCommand::DryRun);
        assert_eq!(parse_trigger_command("/ai apply"), TriggerCommand::Apply);
        assert_eq!(parse_trigger_command("/ai  apply"), TriggerCommand::Apply);
        assert_eq!(parse_trigger_command("\n  /ai\tapply \n"), TriggerCommand::Apply);
        assert_eq!(parse_trigger_command("  /ai  "), TriggerCommand::DryRun);
    }

    #[test]
    fn unit_parse_trigger_command_rejects_everything_else() {
        for raw in [
            "",
            "   ",
            "/ai applyx",
            "/ai apply now",
            "/ai run",
            "/AI",
            "/ai APPLY",
            "please /ai apply",
            "/aiapply",
            "looks good to me",
        ] {
            assert_eq!(parse_trigger_command(raw), TriggerCommand::None, "{raw:?}");
        }
    }

    #[test]
    fn regression_trigger_command_labels_are_stable() {
        assert_eq!(TriggerCommand::None.as_str(), "none");
        assert_eq!(TriggerCommand::DryRun.as_str(), "dry_run");
        assert_eq!(TriggerCommand::Apply.as_str(), "apply");
    }
}
