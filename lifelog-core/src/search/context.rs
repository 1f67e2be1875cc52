//! Shared search context
//!
//! One of these lives for the duration of a single query and lets strategies
//! influence each other: the lexical pass publishes the dates and ids it
//! found, the vector pass reads them for its date bonus, and the refinement
//! loop mines the discovered terms for query variants.
//!
//! Writes are monotonic (sets only grow; per-strategy confidence is
//! replace-with-latest) and go through one uncontended mutex. Readers take
//! snapshots; nobody blocks waiting for another strategy's contribution.

use crate::types::StrategyKind;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct ContextInner {
    discovered_dates: BTreeSet<NaiveDate>,
    hot_ids: BTreeSet<String>,
    discovered_terms: BTreeSet<String>,
    strategy_confidence: BTreeMap<StrategyKind, f32>,
}

/// A point-in-time copy of everything published so far.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Dates surfaced by any strategy
    pub discovered_dates: BTreeSet<NaiveDate>,
    /// Recording ids that scored well somewhere
    pub hot_ids: BTreeSet<String>,
    /// Salient terms mined from strong hits
    pub discovered_terms: BTreeSet<String>,
    /// Latest self-reported confidence per strategy
    pub strategy_confidence: BTreeMap<StrategyKind, f32>,
}

/// Inter-strategy message board for one query.
#[derive(Debug, Default)]
pub struct SharedContext {
    inner: Mutex<ContextInner>,
}

impl SharedContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish discovered dates
    pub fn add_dates<I: IntoIterator<Item = NaiveDate>>(&self, dates: I) {
        self.inner.lock().discovered_dates.extend(dates);
    }

    /// Publish hot recording ids
    pub fn add_hot<I: IntoIterator<Item = String>>(&self, ids: I) {
        self.inner.lock().hot_ids.extend(ids);
    }

    /// Publish salient terms
    pub fn add_terms<I: IntoIterator<Item = String>>(&self, terms: I) {
        self.inner.lock().discovered_terms.extend(terms);
    }

    /// Record a strategy's self-assessed confidence, replacing any earlier value
    pub fn record_confidence(&self, strategy: StrategyKind, confidence: f32) {
        self.inner
            .lock()
            .strategy_confidence
            .insert(strategy, confidence.clamp(0.0, 1.0));
    }

    /// Snapshot of the discovered dates
    #[must_use]
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.inner.lock().discovered_dates.clone()
    }

    /// Snapshot of the hot ids
    #[must_use]
    pub fn hot_ids(&self) -> BTreeSet<String> {
        self.inner.lock().hot_ids.clone()
    }

    /// Snapshot of the discovered terms
    #[must_use]
    pub fn terms(&self) -> BTreeSet<String> {
        self.inner.lock().discovered_terms.clone()
    }

    /// Snapshot of everything at once
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        let inner = self.inner.lock();
        ContextSnapshot {
            discovered_dates: inner.discovered_dates.clone(),
            hot_ids: inner.hot_ids.clone(),
            discovered_terms: inner.discovered_terms.clone(),
            strategy_confidence: inner.strategy_confidence.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn writes_are_monotonic() {
        let ctx = SharedContext::new();
        let d1 = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();
        ctx.add_dates([d1]);
        ctx.add_dates([d2]);
        assert_eq!(ctx.dates().len(), 2);
    }

    #[test]
    fn confidence_is_replace_with_latest() {
        let ctx = SharedContext::new();
        ctx.record_confidence(StrategyKind::Lexical, 0.4);
        ctx.record_confidence(StrategyKind::Lexical, 0.9);
        let snap = ctx.snapshot();
        assert!((snap.strategy_confidence[&StrategyKind::Lexical] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let ctx = SharedContext::new();
        ctx.add_terms(["budget".to_string()]);
        let snap = ctx.snapshot();
        ctx.add_terms(["meeting".to_string()]);
        assert_eq!(snap.discovered_terms.len(), 1);
        assert_eq!(ctx.terms().len(), 2);
    }
}
