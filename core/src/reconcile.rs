//! Last-write-wins reconciliation of the local log with remote rows.
//!
//! Timestamps come from device wall clocks. Two devices with skewed clocks can
//! make an older edit look newer, in which case the genuinely newer edit is
//! silently discarded on the next sync.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{Entry, RemoteRow};
use crate::normalize::normalize_record;

/// Comparison instant of an entry; never-stamped entries sort at the epoch.
fn instant(entry: &Entry) -> DateTime<Utc> {
    entry.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Decode a remote row through the normalizer. The row's key and timestamp
/// columns take precedence over whatever the payload carries.
#[must_use]
pub fn decode_row(row: &RemoteRow) -> Option<Entry> {
    let mut record = match &row.payload {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    record.insert("date".into(), Value::String(row.date.clone()));
    record.insert(
        "updatedAt".into(),
        row.updated_at
            .as_ref()
            .map_or(Value::Null, |t| Value::String(t.clone())),
    );
    normalize_record(&Value::Object(record))
}

/// Merge remote rows into the local log.
///
/// A remote entry replaces the local one for the same date only when its
/// timestamp is strictly later; ties keep the local entry. Rows whose date
/// cannot be decoded are skipped. The result is date-ordered and date-unique.
#[must_use]
pub fn merge(local: &[Entry], remote: &[RemoteRow]) -> Vec<Entry> {
    let mut by_date: BTreeMap<NaiveDate, Entry> =
        local.iter().map(|e| (e.date, e.clone())).collect();

    for row in remote {
        let Some(incoming) = decode_row(row) else {
            warn!(date = %row.date, "skipping undecodable remote row");
            continue;
        };
        let newer = by_date
            .get(&incoming.date)
            .is_none_or(|current| instant(&incoming) > instant(current));
        if newer {
            by_date.insert(incoming.date, incoming);
        }
    }

    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn local(d: u32, weight: f64, updated_at: Option<&str>) -> Entry {
        let mut e = Entry::new(day(d));
        e.weight = Some(weight);
        e.updated_at = updated_at.map(ts);
        e
    }

    fn remote(date: &str, weight: f64, updated_at: Option<&str>) -> RemoteRow {
        RemoteRow {
            date: date.to_string(),
            payload: json!({ "date": date, "weight": weight, "workoutType": "walk" }),
            updated_at: updated_at.map(str::to_string),
        }
    }

    #[test]
    fn test_equal_timestamps_keep_local() {
        let t = "2025-01-05T10:00:00Z";
        let merged = merge(&[local(5, 100.0, Some(t))], &[remote("2025-01-05", 90.0, Some(t))]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].weight, Some(100.0));
    }

    #[test]
    fn test_newer_remote_wins() {
        let merged = merge(
            &[local(5, 100.0, Some("2025-01-05T10:00:00Z"))],
            &[remote("2025-01-05", 90.0, Some("2025-01-05T10:00:01Z"))],
        );
        assert_eq!(merged[0].weight, Some(90.0));
        assert_eq!(merged[0].updated_at, Some(ts("2025-01-05T10:00:01Z")));
    }

    #[test]
    fn test_older_remote_loses() {
        let merged = merge(
            &[local(5, 100.0, Some("2025-01-05T10:00:00Z"))],
            &[remote("2025-01-05", 90.0, Some("2025-01-04T10:00:00Z"))],
        );
        assert_eq!(merged[0].weight, Some(100.0));
    }

    #[test]
    fn test_null_timestamp_loses_to_real_one() {
        let merged = merge(
            &[local(5, 100.0, None)],
            &[remote("2025-01-05", 90.0, Some("2020-01-01T00:00:00Z"))],
        );
        assert_eq!(merged[0].weight, Some(90.0));

        let merged = merge(
            &[local(5, 100.0, Some("2020-01-01T00:00:00Z"))],
            &[remote("2025-01-05", 90.0, None)],
        );
        assert_eq!(merged[0].weight, Some(100.0));
    }

    #[test]
    fn test_both_null_keep_local() {
        let merged = merge(&[local(5, 100.0, None)], &[remote("2025-01-05", 90.0, None)]);
        assert_eq!(merged[0].weight, Some(100.0));
    }

    #[test]
    fn test_remote_only_dates_are_added_in_order() {
        let merged = merge(
            &[local(5, 100.0, None)],
            &[
                remote("2025-01-09", 98.0, None),
                remote("2025-01-01", 101.0, Some("2025-01-01T07:00:00Z")),
            ],
        );
        let dates: Vec<_> = merged.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![day(1), day(5), day(9)]);
    }

    #[test]
    fn test_row_columns_override_payload() {
        let row = RemoteRow {
            date: "2025-01-07".into(),
            payload: json!({
                "date": "1999-12-31",
                "weight": 97.0,
                "updatedAt": "2030-01-01T00:00:00Z"
            }),
            updated_at: Some("2025-01-07T09:00:00Z".into()),
        };
        let e = decode_row(&row).unwrap();
        assert_eq!(e.date, day(7));
        assert_eq!(e.updated_at, Some(ts("2025-01-07T09:00:00Z")));
    }

    #[test]
    fn test_legacy_payload_is_upgraded() {
        let row = RemoteRow {
            date: "2025-01-02".into(),
            payload: json!({ "weight": "99.1", "workout": "B" }),
            updated_at: None,
        };
        let merged = merge(&[], &[row]);
        assert_eq!(merged[0].workout_type, crate::models::WorkoutType::StrengthB);
        assert_eq!(merged[0].weight, Some(99.1));
    }

    #[test]
    fn test_undecodable_row_is_skipped() {
        let merged = merge(
            &[local(5, 100.0, None)],
            &[remote("bad", 90.0, Some("2025-01-05T10:00:00Z"))],
        );
        assert_eq!(merged, vec![local(5, 100.0, None)]);
    }

    #[test]
    fn test_non_object_payload_still_decodes_date() {
        let row = RemoteRow {
            date: "2025-01-03".into(),
            payload: Value::Null,
            updated_at: None,
        };
        let merged = merge(&[], &[row]);
        assert_eq!(merged, vec![Entry::new(day(3))]);
    }
}
