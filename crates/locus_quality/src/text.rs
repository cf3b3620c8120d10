//! Line and token statistics over markdown content.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const REPEATED_LINE_MIN_CHARS: usize = 24;
pub const BIGRAM_OCCURRENCE_THRESHOLD: usize = 3;

lazy_static! {
    static ref HEADING: Regex = Regex::new(r"^#{2,3}\s+").expect("valid heading pattern");
    static ref FAQ_HEADING: Regex = Regex::new(r"^#{3,4}\s+.*\?\s*$").expect("valid faq pattern");
    static ref NON_WORD: Regex = Regex::new(r"[^a-z0-9\s]").expect("valid token pattern");
    static ref SOURCES_HEADING: Regex = Regex::new(r"(?i)^##\s+sources\s*$").expect("valid sources pattern");
}

/// Lowercase, trimmed, with inner whitespace runs collapsed to one space.
pub fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Level-2/3 heading lines in document order.
pub fn heading_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| HEADING.is_match(line))
}

pub fn heading_count(content: &str) -> usize {
    heading_lines(content).count()
}

/// Level 3 and 4 headings phrased as a question.
pub fn faq_question_count(content: &str) -> usize {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| FAQ_HEADING.is_match(line))
        .count()
}

pub fn has_sources_section(content: &str) -> bool {
    content.lines().any(|line| SOURCES_HEADING.is_match(line.trim()))
}

/// Surplus occurrences of long lines, compared case and whitespace
/// insensitively.
pub fn repeated_line_count(content: &str) -> usize {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for line in content.lines() {
        let normalized = normalize_line(line);
        if normalized.chars().count() >= REPEATED_LINE_MIN_CHARS {
            *seen.entry(normalized).or_insert(0) += 1;
        }
    }
    seen.values().filter(|&&n| n > 1).map(|n| n - 1).sum()
}

/// Summed excess of every word bigram over the per-bigram threshold.
pub fn repeated_bigram_excess(content: &str) -> usize {
    let lowered = content.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().filter(|t| t.len() > 2).collect();

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for pair in tokens.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    counts
        .values()
        .filter(|&&n| n > BIGRAM_OCCURRENCE_THRESHOLD)
        .map(|n| n - BIGRAM_OCCURRENCE_THRESHOLD)
        .sum()
}

/// Distinct non-empty entries, compared trimmed and lowercased.
pub fn unique_count(values: &[String]) -> usize {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

pub fn char_count(value: &str) -> usize {
    value.trim().chars().count()
}
