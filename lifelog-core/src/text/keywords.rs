//! Keyword-bag extraction for metadata sidecars

use super::tokenize;
use std::collections::HashMap;

/// Extract up to `max` salient keyword stems from a transcript.
///
/// Frequency-ranked over content tokens, ties broken lexicographically so the
/// bag is deterministic for a given text. Single-character stems and pure
/// numbers are skipped; they carry no retrieval value.
#[must_use]
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        if token.stem.len() < 2 || token.stem.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        *counts.entry(token.stem).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max);
    ranked.into_iter().map(|(stem, _)| stem).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_frequency_then_lexicographic() {
        let text = "budget budget review review budget planning";
        let keywords = extract_keywords(text, 10);
        assert_eq!(keywords[0], "budget");
        assert_eq!(keywords[1], "review");
    }

    #[test]
    fn respects_the_cap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        assert_eq!(extract_keywords(text, 3).len(), 3);
    }

    #[test]
    fn skips_numbers_and_single_chars() {
        let keywords = extract_keywords("12 30 a meeting at 12", 10);
        assert_eq!(keywords, vec!["meeting".to_string()]);
    }

    #[test]
    fn empty_text_yields_empty_bag() {
        assert!(extract_keywords("", 10).is_empty());
    }
}
