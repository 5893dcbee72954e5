use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};

use habitlog_core::models::RemoteStatus;

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today()),
        Some(s) => match s.as_str() {
            "today" => Ok(today()),
            "yesterday" => Ok(today() - chrono::Duration::days(1)),
            "tomorrow" => Ok(today() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Format an optional number with fixed decimals; absent renders empty.
pub(crate) fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    value.map_or_else(String::new, |v| format!("{:.digits$}", no_neg_zero(v)))
}

/// Plain rendering of an optional number (`7`, `7.5`).
pub(crate) fn plain_opt(value: Option<f64>) -> String {
    value.map(|v| no_neg_zero(v).to_string()).unwrap_or_default()
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Tell the user how a best-effort remote call went. Silent when no remote is
/// configured.
pub(crate) fn report_remote(status: &RemoteStatus) {
    match status {
        RemoteStatus::NotConfigured => {}
        RemoteStatus::Failed { .. } | RemoteStatus::NotAuthenticated => {
            eprintln!("Remote: {status} (local data is safe)");
        }
        _ => eprintln!("Remote: {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        assert_eq!(parse_date(None).unwrap(), today());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
        assert!(parse_date(Some("2024-02-30".to_string())).is_err());
    }

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(Some(99.04), 1), "99.0");
        assert_eq!(fmt_opt(Some(-0.0), 2), "0.00");
        assert_eq!(fmt_opt(None, 1), "");
    }

    #[test]
    fn test_plain_opt() {
        assert_eq!(plain_opt(Some(45.0)), "45");
        assert_eq!(plain_opt(Some(7.5)), "7.5");
        assert_eq!(plain_opt(None), "");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Étirements doux", 10), "Étireme...");
        assert_eq!(truncate("Fatigué", 10), "Fatigué");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }
}
