/// Truncates `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

/// Returns the first `max_lines` lines of `text`, noting how many were dropped.
pub fn leading_lines_excerpt(text: &str, max_lines: usize) -> String {
    let lines = text.lines().collect::<Vec<_>>();
    if lines.len() <= max_lines {
        return lines.join("\n");
    }
    let omitted = lines.len() - max_lines;
    format!(
        "{}\n... ({omitted} more line{})",
        lines[..max_lines].join("\n"),
        if omitted == 1 { "" } else { "s" }
    )
}

/// Removes markdown code-fence marker lines (```` ``` ````, ```` ```json ````,
/// ```` ```diff ````) that models wrap around structured output.
///
/// A single-line payload such as ```` ```json {"a":1}``` ```` is unwrapped too.
pub fn strip_code_fences(text: &str) -> String {
    let kept = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>();
    if !kept.is_empty() || !text.contains("```") {
        return kept.join("\n");
    }

    let inner = text.trim();
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner.strip_prefix("```").unwrap_or(inner);
    let language_len = inner
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .count();
    inner[language_len..].trim().to_string()
}
