//! JSON backups, CSV export and backup import.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;

use crate::models::{EXPORT_VERSION, Entry, ExportData, Settings};
use crate::normalize::{normalize_settings, normalize_value};

pub const CSV_COLUMNS: [&str; 10] = [
    "date",
    "weight",
    "steps",
    "workoutType",
    "workoutMin",
    "workoutRpe",
    "extras",
    "sleep",
    "notes",
    "updatedAt",
];

#[must_use]
pub fn json_filename(today: NaiveDate) -> String {
    format!("habitlog-backup-{}.json", today.format("%Y-%m-%d"))
}

#[must_use]
pub fn csv_filename(today: NaiveDate) -> String {
    format!("habitlog-{}.csv", today.format("%Y-%m-%d"))
}

/// Pretty-printed backup document.
pub fn export_json(entries: &[Entry], settings: &Settings, now: DateTime<Utc>) -> Result<String> {
    let data = ExportData {
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        settings: settings.clone(),
        entries: entries.to_vec(),
        version: EXPORT_VERSION.to_string(),
    };
    serde_json::to_string_pretty(&data).context("Failed to serialize backup")
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Notes are always quoted, with embedded quotes doubled.
fn quote_notes(notes: &str) -> String {
    format!("\"{}\"", notes.replace('"', "\"\""))
}

/// CSV with a fixed column order and `\n` line endings.
///
/// Only the notes column can contain separators, so it is quoted by hand and
/// the writer itself never quotes.
pub fn export_csv(entries: &[Entry]) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(CSV_COLUMNS)?;
    for e in entries {
        wtr.write_record([
            e.date_str(),
            opt(e.weight),
            opt(e.steps),
            e.workout_type.as_str().to_string(),
            opt(e.workout_min),
            opt(e.workout_rpe),
            opt(e.extras),
            opt(e.sleep),
            quote_notes(&e.notes),
            opt(e.updated_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))),
        ])?;
    }

    let bytes = wtr.into_inner().context("Failed to flush CSV")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Parsed contents of a backup file, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportData {
    pub entries: Vec<Entry>,
    pub settings: Option<Settings>,
}

/// Parse a backup document.
///
/// A missing or non-array `entries` yields an empty log; `settings` is applied
/// only when it is an object, shallow-merged over the defaults. Invalid JSON or
/// a non-object document is an error.
pub fn parse_import(bytes: &[u8], today: NaiveDate) -> Result<ImportData> {
    let doc: Value = serde_json::from_slice(bytes)
        .context("Import failed: file is not valid JSON")?;
    let Some(obj) = doc.as_object() else {
        bail!("Import failed: expected a backup object exported by habitlog");
    };

    let entries = obj.get("entries").map(normalize_value).unwrap_or_default();
    let settings = obj
        .get("settings")
        .filter(|s| s.is_object())
        .map(|s| normalize_settings(s, today));

    Ok(ImportData { entries, settings })
}
