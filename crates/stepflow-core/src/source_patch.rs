// Metadata surgery on stored document text.
//
// The store never re-serializes an author's document from the parsed model;
// it only rewrites the managed top-level metadata lines. Everything else -
// comments, field order, whitespace - is preserved byte-for-byte.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Metadata fields the store is allowed to rewrite. `None` leaves the
/// corresponding line untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub version: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

static ID_LINE: Lazy<Regex> = Lazy::new(|| line_pattern("id"));
static VERSION_LINE: Lazy<Regex> = Lazy::new(|| line_pattern("version"));
static CREATED_AT_LINE: Lazy<Regex> = Lazy::new(|| line_pattern("createdAt"));
static UPDATED_AT_LINE: Lazy<Regex> = Lazy::new(|| line_pattern("updatedAt"));
static ACTIVE_LINE: Lazy<Regex> = Lazy::new(|| line_pattern("active"));

fn line_pattern(field: &str) -> Regex {
    // Top-level only: the key starts in column zero
    Regex::new(&format!(r#"^(?:"{field}"|{field})\s*:"#)).expect("field pattern compiles")
}

/// Apply a metadata patch to document text.
///
/// Each patched field replaces its existing top-level line, or is inserted
/// after the nearest present anchor: after `id`, then `version`, then
/// `createdAt`, then `updatedAt`, in that priority order.
pub fn apply_metadata(source: &str, patch: &MetadataPatch) -> String {
    let had_trailing_newline = source.ends_with('\n');
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();

    if let Some(version) = patch.version {
        upsert(&mut lines, &VERSION_LINE, format!("version: {version}"), &[&ID_LINE]);
    }
    if let Some(created_at) = patch.created_at {
        upsert(
            &mut lines,
            &CREATED_AT_LINE,
            format!("createdAt: \"{}\"", format_ts(created_at)),
            &[&VERSION_LINE, &ID_LINE],
        );
    }
    if let Some(updated_at) = patch.updated_at {
        upsert(
            &mut lines,
            &UPDATED_AT_LINE,
            format!("updatedAt: \"{}\"", format_ts(updated_at)),
            &[&CREATED_AT_LINE, &VERSION_LINE, &ID_LINE],
        );
    }
    if let Some(active) = patch.active {
        upsert(
            &mut lines,
            &ACTIVE_LINE,
            format!("active: {active}"),
            &[&UPDATED_AT_LINE, &CREATED_AT_LINE, &VERSION_LINE, &ID_LINE],
        );
    }

    let mut out = lines.join("\n");
    if had_trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn upsert(lines: &mut Vec<String>, field: &Regex, replacement: String, anchors: &[&Lazy<Regex>]) {
    if let Some(index) = lines.iter().position(|line| field.is_match(line)) {
        lines[index] = replacement;
        return;
    }
    for anchor in anchors {
        if let Some(index) = lines.iter().position(|line| anchor.is_match(line)) {
            lines.insert(index + 1, replacement);
            return;
        }
    }
    lines.push(replacement);
}
