//! Relative-date resolution
//!
//! Turns expressions like "yesterday" or "last week" into absolute inclusive
//! date ranges, always against a caller-supplied `now` so results are
//! reproducible. Ambiguous inputs yield an empty hint rather than a guess.

use crate::types::{RelativeExpr, TemporalHint};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap()
});
static DAYS_AGO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3})\s+days?\s+ago\b").unwrap()
});
static RELATIVE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \b(
            today | tonight | yesterday |
            this\s+(?:week|month|morning|afternoon|evening) |
            last\s+(?:week|month) |
            \d{1,3}\s+days?\s+ago |
            \d{4}-\d{2}-\d{2}
        )\b",
    )
    .unwrap()
});

/// Resolve the temporal expressions in `raw` against `now`.
///
/// Explicit ISO dates win over relative keywords; the first recognised
/// expression decides. Anything unrecognised leaves the hint empty.
#[must_use]
pub fn resolve_temporal(raw: &str, now: DateTime<Utc>) -> TemporalHint {
    let lower = raw.to_lowercase();
    let today = now.date_naive();

    if let Some(caps) = ISO_DATE.captures(&lower) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        if let Some(date) = date {
            return TemporalHint {
                date_range: Some((date, date)),
                relative: None,
            };
        }
        // A malformed literal like 2024-13-40 is ambiguous; stay empty.
        return TemporalHint::default();
    }

    if let Some(caps) = DAYS_AGO.captures(&lower) {
        let n: u32 = caps[1].parse().unwrap_or(0);
        if let Some(date) = today.checked_sub_days(Days::new(u64::from(n))) {
            return TemporalHint {
                date_range: Some((date, date)),
                relative: Some(RelativeExpr::DaysAgo(n)),
            };
        }
        return TemporalHint::default();
    }

    let keyword_hint = |relative: RelativeExpr, from: NaiveDate, to: NaiveDate| TemporalHint {
        date_range: Some((from, to)),
        relative: Some(relative),
    };

    if lower.contains("yesterday") {
        let Some(date) = today.pred_opt() else {
            return TemporalHint::default();
        };
        return keyword_hint(RelativeExpr::Yesterday, date, date);
    }
    if lower.contains("today")
        || lower.contains("tonight")
        || lower.contains("this morning")
        || lower.contains("this afternoon")
        || lower.contains("this evening")
    {
        return keyword_hint(RelativeExpr::Today, today, today);
    }
    if lower.contains("this week") {
        let week = today.week(Weekday::Mon);
        return keyword_hint(RelativeExpr::ThisWeek, week.first_day(), today);
    }
    if lower.contains("last week") {
        let this_week_start = today.week(Weekday::Mon).first_day();
        let Some(last_week_start) = this_week_start.checked_sub_days(Days::new(7)) else {
            return TemporalHint::default();
        };
        let Some(last_week_end) = this_week_start.pred_opt() else {
            return TemporalHint::default();
        };
        return keyword_hint(RelativeExpr::LastWeek, last_week_start, last_week_end);
    }
    if lower.contains("this month") {
        let Some(first) = today.with_day(1) else {
            return TemporalHint::default();
        };
        return keyword_hint(RelativeExpr::ThisMonth, first, today);
    }
    if lower.contains("last month") {
        let Some(this_first) = today.with_day(1) else {
            return TemporalHint::default();
        };
        let Some(last_first) = this_first.checked_sub_months(Months::new(1)) else {
            return TemporalHint::default();
        };
        let Some(last_end) = this_first.pred_opt() else {
            return TemporalHint::default();
        };
        return keyword_hint(RelativeExpr::LastMonth, last_first, last_end);
    }

    TemporalHint::default()
}

/// Remove recognised temporal phrases so they do not leak into content terms.
#[must_use]
pub fn strip_temporal_phrases(raw: &str) -> String {
    // Case-insensitive replacement over the original string. Lowercasing
    // can change byte lengths outside ASCII; offsets are only valid when it
    // did not.
    let lower = raw.to_lowercase();
    if lower.len() != raw.len() {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0usize;
    for found in RELATIVE_PHRASE.find_iter(&lower) {
        out.push_str(&raw[cursor..found.start()]);
        cursor = found.end();
    }
    out.push_str(&raw[cursor..]);
    out
}
