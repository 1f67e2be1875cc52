//! Text processing shared by the lexical index, the query analyzer and
//! keyword extraction
//!
//! Tokenisation is deliberately simple and deterministic: lowercase,
//! punctuation-stripped tokens with a light suffix stemmer. Both sides of a
//! match (index and query) go through the same pipeline, so the exact
//! stemming scheme matters less than it being shared.

mod keywords;

pub use keywords::extract_keywords;

/// A token produced from a text, carrying enough position information for
/// phrase detection and highlight spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Stemmed, lowercased form used as the index key
    pub stem: String,
    /// Position among all raw tokens of the text (stopwords included), so
    /// adjacency survives stopword removal
    pub position: usize,
    /// Character offset of the raw token in the source text
    pub offset: usize,
    /// Character length of the raw token
    pub len: usize,
}

/// Common English stopwords excluded from indexing and keyword bags.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "did", "do", "does", "for", "from",
    "had", "has", "have", "he", "her", "his", "how", "i", "in", "is", "it", "its", "me", "my",
    "not", "of", "on", "or", "our", "she", "so", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

/// True when `word` (already lowercased) is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Light suffix stemmer.
///
/// Not a linguistic stemmer; it collapses the inflections that actually show
/// up in conversational transcripts (plurals, -ing/-ed forms, possessives).
#[must_use]
pub fn stem(word: &str) -> String {
    let mut w = word;
    if let Some(stripped) = w.strip_suffix("'s") {
        w = stripped;
    }
    if let Some(stripped) = w.strip_suffix('\'') {
        w = stripped;
    }
    if w.len() > 4 {
        if let Some(stripped) = w.strip_suffix("ies") {
            return format!("{stripped}y");
        }
        if let Some(stripped) = w.strip_suffix("ing") {
            return stripped.to_string();
        }
        if let Some(stripped) = w.strip_suffix("ed") {
            return stripped.to_string();
        }
    }
    if w.len() > 3 {
        if let Some(stripped) = w.strip_suffix("es") {
            return stripped.to_string();
        }
        if let Some(stripped) = w.strip_suffix('s') {
            return stripped.to_string();
        }
    }
    w.to_string()
}

/// Tokenise `text` into content tokens.
///
/// Stopwords are dropped but their positions are not reused, so two content
/// tokens separated by a stopword keep a position gap of 2 and phrase
/// detection can still see they were near-adjacent.
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0usize;
    for (offset, raw) in split_words(text) {
        let lower = raw.to_lowercase();
        if !is_stopword(&lower) {
            tokens.push(Token {
                stem: stem(&lower),
                position,
                offset,
                len: raw.len(),
            });
        }
        position += 1;
    }
    tokens
}

/// Lowercase, punctuation-stripped, whitespace-collapsed form of a query,
/// used for answer-cache fingerprinting.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            for c in ch.to_lowercase() {
                out.push(c);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Split into (byte_offset, word) pairs on non-alphanumeric boundaries.
/// Apostrophes inside a word are kept so possessives reach the stemmer.
fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        let is_word = ch.is_alphanumeric() || (ch == '\'' && start.is_some());
        match (is_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push((s, text[s..i].trim_end_matches('\'')));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, text[s..].trim_end_matches('\'')));
    }
    words
}
