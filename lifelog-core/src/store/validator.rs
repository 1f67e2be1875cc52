//! Full-scan corpus validator
//!
//! Checks the invariants the rest of the engine assumes: every recording has
//! a body, a meta sidecar and an embedding sidecar, and the stored hash
//! matches the body. Violations are reported, optionally quarantined, and
//! re-ingested on the next sync pass.

use crate::error::Result;
use crate::store::CorpusStore;
use chrono::NaiveDate;
use futures::StreamExt;
use tracing::{info, warn};

/// What is wrong with an artifact pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Body present, meta sidecar missing or unreadable
    MissingMeta,
    /// Meta present, body missing or unreadable
    MissingBody,
    /// Body and meta present, embedding sidecar missing or unreadable
    MissingEmbeddings,
    /// Stored content hash does not match the body
    HashMismatch,
}

/// One detected invariant violation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Affected recording id
    pub id: String,
    /// Shard date of the artifact
    pub date: NaiveDate,
    /// The violated invariant
    pub kind: IssueKind,
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Recordings examined
    pub scanned: usize,
    /// Violations found, in scan order
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when every invariant held
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Scan the whole corpus for invariant violations.
///
/// # Errors
///
/// Returns storage errors from the range enumeration itself; per-record
/// problems land in the report instead of aborting the scan.
pub async fn validate_corpus(store: &dyn CorpusStore) -> Result<ValidationReport> {
    let stats = store.stats().await?;
    let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) else {
        return Ok(ValidationReport::default());
    };

    let mut report = ValidationReport::default();
    let mut entries = store.list_by_range(earliest, latest);
    while let Some(entry) = entries.next().await {
        let (id, date) = entry?;
        report.scanned += 1;
        if let Some(kind) = check_one(store, &id, date).await {
            warn!(id = %id, date = %date, kind = ?kind, "corpus invariant violation");
            report.issues.push(ValidationIssue { id, date, kind });
        }
    }
    info!(
        scanned = report.scanned,
        issues = report.issues.len(),
        "corpus validation finished"
    );
    Ok(report)
}

/// Quarantine every artifact named in the report so the next sync pass
/// re-downloads it.
///
/// # Errors
///
/// Returns the first storage error encountered while quarantining.
pub async fn quarantine_issues(store: &dyn CorpusStore, report: &ValidationReport) -> Result<usize> {
    for issue in &report.issues {
        store.quarantine(&issue.id, issue.date).await?;
    }
    Ok(report.issues.len())
}

async fn check_one(store: &dyn CorpusStore, id: &str, date: NaiveDate) -> Option<IssueKind> {
    let body = store.get(id, date).await.ok().flatten();
    let meta = store.get_metadata(id, date).await.ok().flatten();
    let embeddings = store.get_embeddings(id, date).await.ok().flatten();

    match (body, meta) {
        (None, None) => None,
        (Some(_), None) => Some(IssueKind::MissingMeta),
        (None, Some(_)) => Some(IssueKind::MissingBody),
        (Some(recording), Some(meta)) => {
            if recording.content_hash() != meta.content_hash {
                Some(IssueKind::HashMismatch)
            } else if embeddings.is_none() {
                Some(IssueKind::MissingEmbeddings)
            } else {
                None
            }
        }
    }
}
