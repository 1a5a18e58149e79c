use std::sync::LazyLock;

use regex::Regex;

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[1-4]\.").expect("static list marker pattern"));

/// Put numbered items `1.`–`4.` of a model reply on their own paragraph.
///
/// A marker already at the start of the text or of a line is left alone, so
/// running the function twice gives the same text. Digits glued to other
/// digits (`14.`, `2.5`) are not list markers.
pub fn format_ai_response(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;

    for marker in LIST_MARKER.find_iter(text) {
        let start = marker.start();
        let before = &text[..start];
        let after = &text[marker.end()..];

        let preceded_by_digit = before.chars().next_back().is_some_and(|c| c.is_ascii_digit());
        let followed_by_space = after.chars().next().is_none_or(char::is_whitespace);
        if preceded_by_digit || !followed_by_space {
            continue;
        }

        let line_start = before.trim_end_matches([' ', '\t']);
        if line_start.is_empty() || line_start.ends_with('\n') {
            continue;
        }

        out.push_str(&text[last..line_start.len()]);
        out.push_str("\n\n");
        last = start;
    }

    out.push_str(&text[last..]);
    out
}
