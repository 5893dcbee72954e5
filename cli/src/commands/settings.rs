use anyhow::Result;

use habitlog_core::models::Settings;
use habitlog_core::service::LogService;

use super::helpers::{parse_date, today};

fn print_settings(settings: &Settings) {
    println!("Goal weight:  {:.1} kg", settings.goal_weight);
    println!("Goal date:    {}", settings.goal_date.format("%Y-%m-%d"));
    println!("Start weight: {:.1} kg", settings.start_weight);
    println!("Start date:   {}", settings.start_date.format("%Y-%m-%d"));
}

pub(crate) fn cmd_settings_show(svc: &LogService, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(svc.settings())?);
    } else {
        print_settings(svc.settings());
    }
    Ok(())
}

pub(crate) fn cmd_settings_set(
    svc: &mut LogService,
    goal_weight: Option<f64>,
    goal_date: Option<String>,
    start_weight: Option<f64>,
    start_date: Option<String>,
    json: bool,
) -> Result<()> {
    let mut settings = svc.settings().clone();
    if let Some(w) = goal_weight {
        settings.goal_weight = w;
    }
    if goal_date.is_some() {
        settings.goal_date = parse_date(goal_date)?;
    }
    if let Some(w) = start_weight {
        settings.start_weight = w;
    }
    if start_date.is_some() {
        settings.start_date = parse_date(start_date)?;
    }

    svc.save_settings(settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(svc.settings())?);
    } else {
        println!("Settings saved");
        print_settings(svc.settings());
    }
    Ok(())
}

pub(crate) fn cmd_settings_reset(svc: &mut LogService, json: bool) -> Result<()> {
    svc.reset_settings(today())?;

    if json {
        println!("{}", serde_json::to_string_pretty(svc.settings())?);
    } else {
        println!("Settings reset to defaults");
        print_settings(svc.settings());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_set_keeps_unspecified_fields() {
        let mut svc = LogService::open_in_memory(today()).unwrap();
        let before = svc.settings().clone();

        cmd_settings_set(&mut svc, Some(85.0), Some("2030-06-01".into()), None, None, true)
            .unwrap();

        let after = svc.settings();
        assert!((after.goal_weight - 85.0).abs() < f64::EPSILON);
        assert_eq!(after.goal_date, NaiveDate::from_ymd_opt(2030, 6, 1).unwrap());
        assert!((after.start_weight - before.start_weight).abs() < f64::EPSILON);
        assert_eq!(after.start_date, before.start_date);
    }

    #[test]
    fn test_set_rejects_bad_date() {
        let mut svc = LogService::open_in_memory(today()).unwrap();
        let before = svc.settings().clone();
        assert!(cmd_settings_set(&mut svc, None, Some("soon".into()), None, None, true).is_err());
        assert_eq!(svc.settings(), &before);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut svc = LogService::open_in_memory(today()).unwrap();
        cmd_settings_set(&mut svc, Some(70.0), None, None, None, true).unwrap();
        cmd_settings_reset(&mut svc, true).unwrap();
        assert_eq!(svc.settings(), &Settings::defaults(today()));
    }
}
