//! Text normalization used for key lookup and answer comparison.

/// Normalize a lookup key: trim, lowercase, collapse inner whitespace.
pub fn normalize_key(key: &str) -> String {
    collapse(key)
}

/// Normalize a spoken or typed answer for exact comparison.
///
/// Transcribed speech often carries trailing punctuation ("Blue."), which is
/// stripped along with surrounding whitespace.
pub fn normalize_answer(answer: &str) -> String {
    let collapsed = collapse(answer);
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_string()
}

/// True if `given` equals `expected` after answer normalization.
///
/// An empty expected answer never matches.
pub fn answers_match(expected: &str, given: &str) -> bool {
    let expected = normalize_answer(expected);
    !expected.is_empty() && expected == normalize_answer(given)
}

fn collapse(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_lowercases_and_collapses() {
        assert_eq!(normalize_key("  C-100 "), "c-100");
        assert_eq!(normalize_key("Ava   Patel"), "ava patel");
    }

    #[test]
    fn answers_match_is_case_insensitive_and_exact() {
        assert!(answers_match("blue", "Blue"));
        assert!(answers_match("blue", " BLUE. "));
        assert!(!answers_match("blue", "light blue"));
        assert!(!answers_match("blue", "blu"));
    }

    #[test]
    fn empty_expected_answer_never_matches() {
        assert!(!answers_match("", ""));
        assert!(!answers_match("  ", "anything"));
    }
}
