//! Versioned-key persistence of the entry log and settings on top of the
//! key-value table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::Database;
use crate::models::{Entry, Settings};
use crate::normalize::{normalize_settings, normalize_value};

pub const ENTRIES_KEY: &str = "habitlog.entries.v3";
/// Older entry slots, newest first.
pub const LEGACY_ENTRY_KEYS: &[&str] = &["habitlog.entries.v2", "habitlog.entries.v1"];
pub const SETTINGS_KEY: &str = "habitlog.settings.v1";

/// Read and parse one slot. Any failure degrades to `None`.
fn read_json(db: &Database, key: &str) -> Option<Value> {
    let raw = match db.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "failed to read storage slot");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "storage slot holds malformed JSON");
            None
        }
    }
}

/// Load the log from the current slot, falling back to legacy slots.
///
/// The first legacy slot holding valid JSON is rewritten under the current
/// key, even when it yields no entries. Never fails: unreadable sources are
/// skipped and the result may be empty.
pub fn load_entries(db: &Database) -> Vec<Entry> {
    if let Some(value) = read_json(db, ENTRIES_KEY) {
        if value.is_array() {
            return normalize_value(&value);
        }
        warn!(key = ENTRIES_KEY, "entries slot is not an array");
    }

    for key in LEGACY_ENTRY_KEYS {
        let Some(value) = read_json(db, key) else {
            continue;
        };
        let entries = normalize_value(&value);
        debug!(key, count = entries.len(), "migrating legacy entries");
        if let Err(e) = save_entries(db, &entries) {
            warn!(error = %e, "failed to rewrite migrated entries");
        }
        return entries;
    }

    Vec::new()
}

/// Replace the whole persisted log.
pub fn save_entries(db: &Database, entries: &[Entry]) -> Result<()> {
    let json = serde_json::to_string(entries)?;
    db.put(ENTRIES_KEY, &json)
        .context("Failed to persist entries")
}

/// Replace the same-date entry or insert a new one, keeping date order.
#[must_use]
pub fn upsert(mut log: Vec<Entry>, entry: Entry) -> Vec<Entry> {
    match log.binary_search_by_key(&entry.date, |e| e.date) {
        Ok(i) => log[i] = entry,
        Err(i) => log.insert(i, entry),
    }
    log
}

#[must_use]
pub fn delete(mut log: Vec<Entry>, date: NaiveDate) -> Vec<Entry> {
    log.retain(|e| e.date != date);
    log
}

/// Replace the log and, when given, the settings in a single transaction.
pub fn save_all(db: &Database, entries: &[Entry], settings: Option<&Settings>) -> Result<()> {
    db.atomically(|db| {
        save_entries(db, entries)?;
        if let Some(settings) = settings {
            save_settings(db, settings)?;
        }
        Ok(())
    })
}

/// Stored settings shallow-merged over the defaults. Never fails.
pub fn load_settings(db: &Database, today: NaiveDate) -> Settings {
    read_json(db, SETTINGS_KEY)
        .map_or_else(|| Settings::defaults(today), |v| normalize_settings(&v, today))
}

pub fn save_settings(db: &Database, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string(settings)?;
    db.put(SETTINGS_KEY, &json)
        .context("Failed to persist settings")
}

/// Remove the current, legacy and settings slots.
pub fn wipe(db: &Database) -> Result<()> {
    for key in std::iter::once(&ENTRIES_KEY)
        .chain(LEGACY_ENTRY_KEYS)
        .chain(std::iter::once(&SETTINGS_KEY))
    {
        db.remove(key)?;
    }
    Ok(())
}
