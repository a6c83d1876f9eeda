/// Maximum number of characters in a result preview before truncation.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Split text into lowercase word tokens.
///
/// A word is a maximal run of alphanumeric characters or underscores, so
/// `fetchData(url)` yields `["fetchdata", "url"]` and `snake_case` stays whole.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Build a single-line preview of `text`.
///
/// Takes the first [`SNIPPET_MAX_CHARS`] characters, replaces newlines with
/// spaces and appends `...` when the text was longer.
pub fn preview(text: &str) -> String {
    let mut snippet: String = text
        .chars()
        .take(SNIPPET_MAX_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if text.chars().nth(SNIPPET_MAX_CHARS).is_some() {
        snippet.push_str("...");
    }
    snippet
}

/// Prepend line numbers to each line of text.
///
/// `start_line` is the number to assign to the first line (1-indexed).
pub fn add_line_numbers(text: &str, start_line: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", start_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}
