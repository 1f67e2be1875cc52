//! On-disk body format
//!
//! Bodies are UTF-8 text with a fixed header block, the transcript, and an
//! optional trailing headings section:
//!
//! ```text
//! # Title: <title>
//! **ID:** <id>
//! **Start:** <ISO-8601>
//! **End:** <ISO-8601>
//! ---
//! <transcript>
//! ## Headings
//! - <h1>
//! ```
//!
//! Rendering then parsing must reproduce the transcript text exactly; the
//! round-trip property is load-bearing for content hashing.

use crate::error::{Error, Result};
use crate::types::Recording;
use chrono::{DateTime, SecondsFormat, Utc};

const HEADER_SEPARATOR: &str = "---";
const HEADINGS_MARKER: &str = "## Headings";

/// Render a recording into its on-disk body form.
#[must_use]
pub fn render_body(recording: &Recording) -> String {
    let mut out = String::with_capacity(recording.text.len() + 256);
    out.push_str(&format!("# Title: {}\n", recording.title));
    out.push_str(&format!("**ID:** {}\n", recording.id));
    out.push_str(&format!(
        "**Start:** {}\n",
        recording.start_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!(
        "**End:** {}\n",
        recording.end_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(HEADER_SEPARATOR);
    out.push('\n');
    out.push_str(&recording.text);
    if !recording.headings.is_empty() {
        out.push('\n');
        out.push_str(HEADINGS_MARKER);
        for heading in &recording.headings {
            out.push_str("\n- ");
            out.push_str(heading);
        }
    }
    out
}

/// Parse an on-disk body back into a recording.
///
/// # Errors
///
/// Returns `Corrupt` when the fixed header block is malformed.
pub fn parse_body(raw: &str) -> Result<Recording> {
    let mut lines = raw.lines();
    let title = strip_prefix_line(lines.next(), "# Title: ")?;
    let id = strip_prefix_line(lines.next(), "**ID:** ")?;
    let start = parse_instant(&strip_prefix_line(lines.next(), "**Start:** ")?)?;
    let end = parse_instant(&strip_prefix_line(lines.next(), "**End:** ")?)?;
    match lines.next() {
        Some(HEADER_SEPARATOR) => {}
        _ => return Err(Error::Corrupt("body missing header separator".into())),
    }

    // Everything after the separator line is transcript, possibly followed
    // by a headings section.
    let header_len = raw
        .lines()
        .take(5)
        .map(|l| l.len() + 1)
        .sum::<usize>();
    let rest = &raw[header_len.min(raw.len())..];

    let (text, headings) = split_headings(rest);

    let recording = Recording::new(id, title, start, end, text)?;
    Ok(recording.with_headings(headings))
}

/// Extract section markers (`#`-prefixed lines) from a transcript body.
#[must_use]
pub fn extract_headings(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let stripped = trimmed
                .strip_prefix("### ")
                .or_else(|| trimmed.strip_prefix("## "))
                .or_else(|| trimmed.strip_prefix("# "))?;
            let heading = stripped.trim();
            (!heading.is_empty()).then(|| heading.to_string())
        })
        .collect()
}

/// Extract the ordered set of distinct speakers from a transcript.
///
/// Utterance lines carry a speaker tag and an embedded timestamp, e.g.
/// `Alice (12:30 PM): we should leave soon`.
#[must_use]
pub fn extract_speakers(text: &str) -> Vec<String> {
    let mut speakers = Vec::new();
    for line in text.lines() {
        if let Some(name) = speaker_of_line(line) {
            if !speakers.iter().any(|s| s == &name) {
                speakers.push(name);
            }
        }
    }
    speakers
}

/// Speaker name of an utterance line, if the line is one.
fn speaker_of_line(line: &str) -> Option<String> {
    let trimmed = line.trim_start().trim_start_matches(['-', '*']).trim_start();
    let open = trimmed.find('(')?;
    let close = trimmed[open..].find(')')? + open;
    let colon = trimmed[close..].find(':')? + close;
    // Nothing but whitespace may sit between ')' and ':'
    if !trimmed[close + 1..colon].trim().is_empty() {
        return None;
    }
    let name = trimmed[..open].trim();
    let stamp = &trimmed[open + 1..close];
    if name.is_empty() || name.len() > 48 || !name.chars().next()?.is_uppercase() {
        return None;
    }
    // The parenthesised part must look like a clock time
    if !stamp.chars().next()?.is_ascii_digit() || !stamp.contains(':') {
        return None;
    }
    Some(name.to_string())
}

fn strip_prefix_line(line: Option<&str>, prefix: &str) -> Result<String> {
    line.and_then(|l| l.strip_prefix(prefix))
        .map(str::to_string)
        .ok_or_else(|| Error::Corrupt(format!("body missing `{prefix}` header line")))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("unparsable instant `{raw}`: {e}")))
}

/// Split a post-header body into (transcript, headings).
///
/// The headings section is only recognised when the final lines are exactly
/// the marker followed by `- ` items; anything else stays transcript text.
fn split_headings(rest: &str) -> (String, Vec<String>) {
    let Some(pos) = rest.rfind(&format!("\n{HEADINGS_MARKER}")) else {
        return (rest.to_string(), Vec::new());
    };
    let candidate = &rest[pos + 1..];
    let mut lines = candidate.lines();
    if lines.next() != Some(HEADINGS_MARKER) {
        return (rest.to_string(), Vec::new());
    }
    let mut headings = Vec::new();
    for line in lines {
        match line.strip_prefix("- ") {
            Some(h) => headings.push(h.to_string()),
            None => return (rest.to_string(), Vec::new()),
        }
    }
    if headings.is_empty() {
        return (rest.to_string(), Vec::new());
    }
    (rest[..pos].to_string(), headings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Recording {
        let start = Utc.with_ymd_and_hms(2025, 6, 5, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 5, 13, 0, 0).unwrap();
        Recording::new(
            "rec-1",
            "Afternoon plans",
            start,
            end,
            "Alice (12:30 PM): kids went to Mimi's house at 12:30\nBob (12:31 PM): sounds good",
        )
        .unwrap()
        .with_headings(vec!["Plans".to_string()])
    }

    #[test]
    fn round_trip_is_exact() {
        let recording = sample();
        let parsed = parse_body(&render_body(&recording)).unwrap();
        assert_eq!(parsed, recording);
        assert_eq!(parsed.text, recording.text);
    }

    #[test]
    fn round_trip_without_headings() {
        let mut recording = sample();
        recording.headings.clear();
        let parsed = parse_body(&render_body(&recording)).unwrap();
        assert_eq!(parsed, recording);
    }

    #[test]
    fn malformed_header_is_corrupt() {
        let err = parse_body("not a body").unwrap_err();
        assert_eq!(err.code(), "E_CORRUPT");
    }

    #[test]
    fn speakers_are_ordered_and_distinct() {
        let recording = sample();
        assert_eq!(extract_speakers(&recording.text), vec!["Alice", "Bob"]);
    }

    #[test]
    fn non_utterance_lines_are_ignored() {
        assert!(extract_speakers("just some narration (not a time): here").is_empty());
        assert!(extract_speakers("## Heading").is_empty());
    }

    #[test]
    fn headings_extracted_from_markdownish_text() {
        let text = "## Morning\ntalk\n### Standup\nmore talk";
        assert_eq!(extract_headings(text), vec!["Morning", "Standup"]);
    }

    proptest::proptest! {
        #[test]
        fn render_parse_round_trips_printable_bodies(
            text in "[ -~\n]{0,200}",
            title in "[ -~]{0,40}",
        ) {
            let start = Utc.with_ymd_and_hms(2025, 6, 5, 12, 0, 0).unwrap();
            let end = Utc.with_ymd_and_hms(2025, 6, 5, 13, 0, 0).unwrap();
            let recording = Recording::new("rec-prop", title, start, end, text).unwrap();
            let parsed = parse_body(&render_body(&recording)).unwrap();
            proptest::prop_assert_eq!(parsed, recording);
        }
    }

    #[test]
    fn body_containing_marker_mid_text_survives() {
        let start = Utc.with_ymd_and_hms(2025, 6, 5, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 5, 13, 0, 0).unwrap();
        let tricky = "before\n## Headings\nnot a list item\nafter";
        let recording = Recording::new("rec-2", "Tricky", start, end, tricky).unwrap();
        let parsed = parse_body(&render_body(&recording)).unwrap();
        assert_eq!(parsed.text, tricky);
        assert!(parsed.headings.is_empty());
    }
}
