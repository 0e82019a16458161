use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

const SUMMARY_SENTENCES: usize = 3;

// +91-prefixed ten digit numbers, or bare ten digit numbers optionally split 5+5.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?91[ -]?\d{10}|\b\d{5}[-.\s]?\d{5}\b").expect("phone pattern compiles")
});

/// Returns every non-overlapping phone number match, left to right.
pub fn extract_phone_numbers(text: &str) -> Vec<String> {
    PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First three sentences of `text`, trimmed and joined by a single space.
///
/// Hard-wrapped lines are rejoined first so a line break inside a sentence does not end it.
/// Blank lines still separate paragraphs.
pub fn summarize(text: &str) -> String {
    join_wrapped_lines(text)
        .split_sentence_bounds()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .take(SUMMARY_SENTENCES)
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_wrapped_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paragraph_break = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            paragraph_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { " " });
        }
        out.push_str(line);
        paragraph_break = false;
    }
    out
}
