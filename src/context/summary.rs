//! Deterministic summary merging for the current task.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::util::truncate_chars;

pub const DEFAULT_MAX_CHARS: usize = 800;

// Terminal punctuation followed by whitespace or the end of the text.
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)").unwrap());

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if sentence.chars().any(|c| c.is_alphanumeric()) {
        out.push(sentence);
    }
}

/// Split text into trimmed, whitespace-normalized sentences. Punctuation
/// inside a word (`a.txt`, `1.5`) does not end a sentence.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let end = m.start() + m.as_str().trim_end().len();
        push_sentence(&mut out, &text[start..end]);
        start = m.end();
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn dedupe_key(sentence: &str) -> String {
    sentence
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Merge `new_info` into `existing`.
///
/// Duplicate sentences (ignoring case and whitespace) keep only their latest
/// occurrence, and the oldest sentences are dropped until the joined result
/// fits `max_chars`. A single sentence longer than `max_chars` is truncated.
pub fn merge(existing: &str, new_info: &str, max_chars: usize) -> String {
    let mut all = sentences(existing);
    all.extend(sentences(new_info));

    let mut seen = HashSet::new();
    let mut newest_first: Vec<String> = all
        .into_iter()
        .rev()
        .filter(|s| seen.insert(dedupe_key(s)))
        .collect();

    let mut kept = Vec::new();
    let mut len = 0usize;
    for sentence in newest_first.drain(..) {
        let added = sentence.chars().count() + usize::from(!kept.is_empty());
        if len + added > max_chars {
            if kept.is_empty() {
                kept.push(truncate_chars(&sentence, max_chars));
            }
            break;
        }
        len += added;
        kept.push(sentence);
    }

    kept.reverse();
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_split_and_normalize() {
        let parts = sentences("Read 2 files.  Planned   3 edits!\nDone? trailing");
        assert_eq!(
            parts,
            vec!["Read 2 files.", "Planned 3 edits!", "Done?", "trailing"]
        );
        assert!(sentences("  . ! ").is_empty());
        assert_eq!(sentences("Edited a.txt lines 2-3."), vec!["Edited a.txt lines 2-3."]);
    }

    #[test]
    fn test_merge_appends_new_sentences() {
        let merged = merge("Read 2 files.", "Planned 1 edit.", 800);
        assert_eq!(merged, "Read 2 files. Planned 1 edit.");
    }

    #[test]
    fn test_merge_dedupes_keeping_latest() {
        let merged = merge("Read 2 files. Planned 1 edit.", "read 2   FILES.", 800);
        assert_eq!(merged, "Planned 1 edit. read 2 FILES.");
    }

    #[test]
    fn test_merge_keeps_most_recent_within_limit() {
        let merged = merge("Alpha one. Beta two.", "Gamma three.", 25);
        assert_eq!(merged, "Beta two. Gamma three.");
        assert!(merged.chars().count() <= 25);
    }

    #[test]
    fn test_merge_truncates_single_oversized_sentence() {
        let merged = merge("", "This sentence is much too long to fit.", 12);
        assert_eq!(merged.chars().count(), 12);
        assert!(merged.ends_with("..."));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let a = merge("One. Two. Three.", "Two. Four.", 800);
        let b = merge("One. Two. Three.", "Two. Four.", 800);
        assert_eq!(a, b);
        assert_eq!(a, "One. Three. Two. Four.");
    }
}
