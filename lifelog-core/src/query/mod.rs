//! Query analysis
//!
//! A pure, rule-based pass from the raw query string to a structured record:
//! content terms, candidate phrases, temporal hints, intent and entity
//! mentions. The analyzer never fails; anything it cannot make sense of
//! simply contributes nothing.

mod temporal;

pub use temporal::resolve_temporal;

use crate::text::{self, Token};
use crate::types::{AnalyzedQuery, EntityKind, EntityRef, QueryIntent};
use chrono::{DateTime, Utc};

/// Words that open an interrogative query.
const QUESTION_OPENERS: &[&str] = &[
    "can", "did", "do", "does", "how", "is", "was", "what", "when", "where", "which", "who", "why",
];

/// Words that open an imperative query.
const COMMAND_OPENERS: &[&str] = &["find", "get", "give", "list", "search", "show"];

/// Rule-based query analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    /// Create an analyzer
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Analyse a raw query against a caller-supplied `now`.
    ///
    /// Total function: every input yields a value. Temporal keywords are
    /// consumed into the hint and do not appear among the content terms.
    #[must_use]
    pub fn analyze(&self, raw: &str, now: DateTime<Utc>) -> AnalyzedQuery {
        let temporal = resolve_temporal(raw, now);
        let stripped = temporal::strip_temporal_phrases(raw);

        let tokens = text::tokenize(&stripped);
        let mut terms: Vec<String> = Vec::new();
        for token in &tokens {
            if !terms.contains(&token.stem) {
                terms.push(token.stem.clone());
            }
        }

        let mut phrases = quoted_phrases(raw);
        phrases.extend(adjacent_runs(&tokens));
        phrases.retain(|p| p.len() >= 2);
        phrases.dedup();

        AnalyzedQuery {
            raw: raw.to_string(),
            normalized: text::normalize(raw),
            terms,
            phrases,
            temporal,
            intent: detect_intent(raw),
            entities: detect_entities(raw),
        }
    }
}

fn detect_intent(raw: &str) -> QueryIntent {
    let trimmed = raw.trim();
    if trimmed.ends_with('?') {
        return QueryIntent::Question;
    }
    let first = trimmed
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if QUESTION_OPENERS.contains(&first.as_str()) {
        QueryIntent::Question
    } else if COMMAND_OPENERS.contains(&first.as_str()) {
        QueryIntent::Command
    } else {
        QueryIntent::Search
    }
}

/// Quoted spans become exact phrases.
fn quoted_phrases(raw: &str) -> Vec<Vec<String>> {
    let mut phrases = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else { break };
        let stems: Vec<String> = text::tokenize(&after[..close])
            .into_iter()
            .map(|t| t.stem)
            .collect();
        if !stems.is_empty() {
            phrases.push(stems);
        }
        rest = &after[close + 1..];
    }
    phrases
}

/// Runs of content terms that sat (near-)adjacent in the query.
fn adjacent_runs(tokens: &[Token]) -> Vec<Vec<String>> {
    let mut runs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut last_position: Option<usize> = None;
    for token in tokens {
        let adjacent = last_position.is_some_and(|p| token.position - p <= 2);
        if !adjacent && current.len() >= 2 {
            runs.push(std::mem::take(&mut current));
        } else if !adjacent {
            current.clear();
        }
        current.push(token.stem.clone());
        last_position = Some(token.position);
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// Capitalised mid-query words and quoted literals become entity mentions.
fn detect_entities(raw: &str) -> Vec<EntityRef> {
    let mut entities = Vec::new();
    for quoted in quoted_phrases(raw) {
        entities.push(EntityRef {
            text: quoted.join(" "),
            kind: EntityKind::Quoted,
        });
    }
    for (i, word) in raw.split_whitespace().enumerate() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '\'')
            .collect();
        let mut chars = cleaned.chars();
        let Some(first) = chars.next() else { continue };
        // Skip the sentence-initial capital; it carries no signal.
        if i == 0 || !first.is_uppercase() {
            continue;
        }
        let text = cleaned.trim_end_matches("'s").to_string();
        if text.len() < 2 {
            continue;
        }
        let kind = if chars.all(char::is_lowercase) {
            EntityKind::Person
        } else {
            EntityKind::Other
        };
        if !entities.iter().any(|e| e.text == text) {
            entities.push(EntityRef { text, kind });
        }
    }
    entities
}
