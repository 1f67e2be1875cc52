//! Analysed-query types produced by the query analyzer

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Detected intent of a raw query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryIntent {
    /// Interrogative phrasing ("where did ...?", "what was ...?")
    Question,
    /// Plain keyword lookup
    Search,
    /// Imperative phrasing ("show me ...", "find ...")
    Command,
}

/// A relative date expression recognised in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelativeExpr {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    /// "N days ago"
    DaysAgo(u32),
}

/// Temporal hints extracted from a query.
///
/// Ambiguous expressions yield an empty hint rather than a guess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalHint {
    /// Absolute inclusive date range resolved against the caller's `now`
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// The relative expression the range came from, if any
    pub relative: Option<RelativeExpr>,
}

impl TemporalHint {
    /// True when no temporal signal was recognised
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.relative.is_none()
    }
}

/// Kind of entity referenced by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Capitalised name likely referring to a person
    Person,
    /// Quoted literal the user wants matched verbatim
    Quoted,
    /// Anything else recognised as a proper noun
    Other,
}

/// An entity mention recognised in the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Surface text of the mention
    pub text: String,
    /// Best-effort classification
    pub kind: EntityKind,
}

/// Structured view of a raw query string.
///
/// Produced by [`crate::query::QueryAnalyzer::analyze`], which is total: any
/// input yields a value, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedQuery {
    /// The query as the caller provided it
    pub raw: String,
    /// Lowercased, whitespace-collapsed form used for fingerprinting
    pub normalized: String,
    /// Content terms after tokenisation and stopword removal
    pub terms: Vec<String>,
    /// Candidate phrases (quoted spans and adjacent content-term runs)
    pub phrases: Vec<Vec<String>>,
    /// Temporal hints resolved against the caller-supplied now
    pub temporal: TemporalHint,
    /// Detected intent
    pub intent: QueryIntent,
    /// Entity mentions
    pub entities: Vec<EntityRef>,
}

impl AnalyzedQuery {
    /// True when tokenisation produced no usable terms
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
