//! Canonicalization of loosely-typed entry records.
//!
//! Every ingestion path (local storage, file import, remote rows) funnels
//! through [`normalize_entries`], so all of them produce the same shape.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::models::{Entry, Settings, WorkoutType};

type Record = Map<String, Value>;

/// On-disk entry shapes, oldest first.
///
/// * `V1` stores the workout as a legacy `workout` field ("A" / "B").
/// * `V2` has `workoutType` but no camelCase `updatedAt` (possibly a
///   snake_case `updated_at` coming from remote rows).
/// * `V3` is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Shape {
    V1,
    V2,
    V3,
}

/// Upgrade steps; each maps a record of the tagged shape to the next one.
const UPGRADES: &[(Shape, fn(Record) -> Record)] = &[
    (Shape::V1, upgrade_v1_workout),
    (Shape::V2, upgrade_v2_timestamp),
];

fn detect_shape(record: &Record) -> Shape {
    if record.contains_key("workout") {
        return Shape::V1;
    }
    if record.contains_key("updated_at") || !record.contains_key("updatedAt") {
        return Shape::V2;
    }
    Shape::V3
}

fn upgrade(record: Record) -> Record {
    let from = detect_shape(&record);
    UPGRADES
        .iter()
        .filter(|(shape, _)| *shape >= from)
        .fold(record, |r, (_, step)| step(r))
}

fn upgrade_v1_workout(mut record: Record) -> Record {
    let legacy = record.remove("workout");
    if non_empty_str(record.get("workoutType")).is_none() {
        if let Some(legacy) = legacy.filter(is_truthy) {
            let mapped = match legacy.as_str() {
                Some("A") => WorkoutType::StrengthA,
                Some("B") => WorkoutType::StrengthB,
                _ => WorkoutType::None,
            };
            record.insert("workoutType".into(), Value::String(mapped.as_str().into()));
        }
    }
    record
}

fn upgrade_v2_timestamp(mut record: Record) -> Record {
    let snake = record.remove("updated_at");
    let resolved = non_empty_str(record.get("updatedAt"))
        .or_else(|| non_empty_str(snake.as_ref()))
        .map(str::to_string);
    record.insert(
        "updatedAt".into(),
        resolved.map_or(Value::Null, Value::String),
    );
    record
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Permissive numeric parser. Null, absent, blank strings, unparseable strings
/// and non-finite results are all "absent", never zero.
#[must_use]
pub fn parse_num(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse the `YYYY-MM-DD` prefix of a string at least ten bytes long.
#[must_use]
pub fn parse_date_prefix(value: Option<&Value>) -> Option<NaiveDate> {
    let s = value?.as_str()?;
    if s.len() < 10 {
        return None;
    }
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

/// Parse an RFC 3339 instant; anything else compares as the epoch, i.e. `None`.
#[must_use]
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = non_empty_str(value)?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_steps(value: Option<&Value>) -> Option<u64> {
    let n = parse_num(value)?.round();
    (n >= 0.0 && n <= u64::MAX as f64).then_some(n as u64)
}

fn parse_workout(value: Option<&Value>) -> WorkoutType {
    match non_empty_str(value) {
        None => WorkoutType::None,
        Some(s) => s.parse().unwrap_or(WorkoutType::Other),
    }
}

fn coerce_notes(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) if is_truthy(v) => v.to_string(),
        _ => String::new(),
    }
}

fn coerce(record: &Record) -> Option<Entry> {
    let date = parse_date_prefix(record.get("date"))?;
    Some(Entry {
        date,
        weight: parse_num(record.get("weight")),
        steps: parse_steps(record.get("steps")),
        workout_type: parse_workout(record.get("workoutType")),
        workout_min: parse_num(record.get("workoutMin")),
        workout_rpe: parse_num(record.get("workoutRpe")),
        extras: parse_num(record.get("extras")),
        sleep: parse_num(record.get("sleep")),
        notes: coerce_notes(record.get("notes")),
        updated_at: parse_timestamp(record.get("updatedAt")),
    })
}

/// Normalize a single candidate; `None` when it has no usable date.
#[must_use]
pub fn normalize_record(candidate: &Value) -> Option<Entry> {
    let record = candidate.as_object()?.clone();
    coerce(&upgrade(record))
}

/// Turn arbitrary candidate records into a date-ordered, date-unique log.
///
/// Candidates without a usable date are dropped. When a date repeats, the
/// later candidate wins.
#[must_use]
pub fn normalize_entries(candidates: &[Value]) -> Vec<Entry> {
    let by_date: BTreeMap<NaiveDate, Entry> = candidates
        .iter()
        .filter_map(normalize_record)
        .map(|e| (e.date, e))
        .collect();
    by_date.into_values().collect()
}

/// Like [`normalize_entries`] but accepts any JSON value; non-arrays yield an
/// empty log.
#[must_use]
pub fn normalize_value(value: &Value) -> Vec<Entry> {
    value
        .as_array()
        .map(|candidates| normalize_entries(candidates))
        .unwrap_or_default()
}

/// Shallow-merge a stored settings object over the defaults. Fields that are
/// missing or do not parse keep their default.
#[must_use]
pub fn normalize_settings(value: &Value, today: NaiveDate) -> Settings {
    let mut settings = Settings::defaults(today);
    let Some(obj) = value.as_object() else {
        return settings;
    };
    if let Some(w) = parse_num(obj.get("goalWeight")) {
        settings.goal_weight = w;
    }
    if let Some(d) = parse_date_prefix(obj.get("goalDate")) {
        settings.goal_date = d;
    }
    if let Some(w) = parse_num(obj.get("startWeight")) {
        settings.start_weight = w;
    }
    if let Some(d) = parse_date_prefix(obj.get("startDate")) {
        settings.start_date = d;
    }
    settings
}
