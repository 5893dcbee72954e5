use anyhow::Result;
use chrono::Utc;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::remote::RemoteClient;
use habitlog_core::models::{Entry, WorkoutType};
use habitlog_core::service::LogService;

use super::helpers::{fmt_opt, parse_date, plain_opt, report_remote, today, truncate};

/// Entry fields that `--clear` can reset to absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum EntryField {
    Weight,
    Steps,
    Workout,
    WorkoutMin,
    Rpe,
    Extras,
    Sleep,
    Notes,
}

/// Fields of the entry form. Unset fields keep the value already recorded for
/// that date unless `replace` starts from a blank entry; `clear` resets fields
/// before the given values are applied.
#[derive(Default)]
pub(crate) struct EntryFields {
    pub replace: bool,
    pub clear: Vec<EntryField>,
    pub date: Option<String>,
    pub weight: Option<f64>,
    pub steps: Option<u64>,
    pub workout: Option<String>,
    pub workout_min: Option<f64>,
    pub rpe: Option<f64>,
    pub extras: Option<f64>,
    pub sleep: Option<f64>,
    pub notes: Option<String>,
}

impl EntryFields {
    fn apply(self, mut entry: Entry) -> Result<Entry> {
        for field in &self.clear {
            match field {
                EntryField::Weight => entry.weight = None,
                EntryField::Steps => entry.steps = None,
                EntryField::Workout => entry.workout_type = WorkoutType::None,
                EntryField::WorkoutMin => entry.workout_min = None,
                EntryField::Rpe => entry.workout_rpe = None,
                EntryField::Extras => entry.extras = None,
                EntryField::Sleep => entry.sleep = None,
                EntryField::Notes => entry.notes.clear(),
            }
        }
        if let Some(w) = self.weight {
            entry.weight = Some(w);
        }
        if let Some(s) = self.steps {
            entry.steps = Some(s);
        }
        if let Some(ref w) = self.workout {
            entry.workout_type = w.parse::<WorkoutType>()?;
        }
        if let Some(m) = self.workout_min {
            entry.workout_min = Some(m);
        }
        if let Some(r) = self.rpe {
            entry.workout_rpe = Some(r);
        }
        if let Some(x) = self.extras {
            entry.extras = Some(x);
        }
        if let Some(s) = self.sleep {
            entry.sleep = Some(s);
        }
        if let Some(n) = self.notes {
            entry.notes = n;
        }
        Ok(entry)
    }
}

pub(crate) async fn cmd_log(
    svc: &mut LogService,
    remote: Option<&RemoteClient>,
    mut fields: EntryFields,
    json: bool,
) -> Result<()> {
    let date = parse_date(fields.date.take())?;
    let base = if fields.replace {
        Entry::new(date)
    } else {
        svc.entry(date).cloned().unwrap_or_else(|| Entry::new(date))
    };
    let entry = fields.apply(base)?;

    let now = Utc::now();
    let stored = svc.record(entry, now)?;
    let status = svc.push_entry(remote, date, now).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "entry": stored,
                "remote": status,
            }))?
        );
    } else {
        println!("Logged {}", stored.date_str());
        print_entry(&stored);
        report_remote(&status);
    }

    Ok(())
}

fn print_entry(e: &Entry) {
    if let Some(w) = e.weight {
        println!("  Weight:  {w:.1} kg");
    }
    if let Some(s) = e.steps {
        println!("  Steps:   {s}");
    }
    if e.workout_type != WorkoutType::None {
        let mut line = format!("  Workout: {}", e.workout_type.label());
        if let Some(m) = e.workout_min {
            line.push_str(&format!(", {} min", plain_opt(Some(m))));
        }
        if let Some(r) = e.workout_rpe {
            line.push_str(&format!(", RPE {}", plain_opt(Some(r))));
        }
        println!("{line}");
    }
    if let Some(x) = e.extras {
        println!("  Extras:  {}", plain_opt(Some(x)));
    }
    if let Some(s) = e.sleep {
        println!("  Sleep:   {s:.1} h");
    }
    if !e.notes.is_empty() {
        println!("  Notes:   {}", e.notes);
    }
}

pub(crate) fn cmd_show(svc: &LogService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let date_str = date.format("%Y-%m-%d");

    if let Some(e) = svc.entry(date) {
        if json {
            println!("{}", serde_json::to_string_pretty(e)?);
        } else {
            println!("{date_str}");
            print_entry(e);
        }
    } else if json {
        println!(
            "{}",
            serde_json::json!({ "error": format!("No entry for {date_str}") })
        );
    } else {
        eprintln!("No entry for {date_str}");
    }

    Ok(())
}

pub(crate) fn cmd_history(svc: &LogService, days: Option<u32>, json: bool) -> Result<()> {
    let cutoff = days.map(|d| today() - chrono::Duration::days(i64::from(d)));
    let entries: Vec<&Entry> = svc
        .entries()
        .iter()
        .rev()
        .filter(|e| cutoff.is_none_or(|c| e.date > c))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No entries found. Use `habitlog log` to record a day.");
    } else {
        #[derive(Tabled)]
        struct EntryRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight")]
            weight: String,
            #[tabled(rename = "Steps")]
            steps: String,
            #[tabled(rename = "Workout")]
            workout: String,
            #[tabled(rename = "Min")]
            minutes: String,
            #[tabled(rename = "RPE")]
            rpe: String,
            #[tabled(rename = "Extras")]
            extras: String,
            #[tabled(rename = "Sleep")]
            sleep: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<EntryRow> = entries
            .iter()
            .map(|e| EntryRow {
                date: e.date_str(),
                weight: fmt_opt(e.weight, 1),
                steps: e.steps.map(|s| s.to_string()).unwrap_or_default(),
                workout: e.workout_type.label().to_string(),
                minutes: plain_opt(e.workout_min),
                rpe: plain_opt(e.workout_rpe),
                extras: plain_opt(e.extras),
                sleep: fmt_opt(e.sleep, 1),
                notes: truncate(&e.notes, 30),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
            .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) async fn cmd_delete(
    svc: &mut LogService,
    remote: Option<&RemoteClient>,
    date: &str,
    json: bool,
) -> Result<()> {
    let date = parse_date(Some(date.to_string()))?;
    let removed = svc.remove(date)?;
    // The remote copy goes even if this device never had the entry.
    let status = svc.delete_remote(remote, date).await;
    let date_str = date.format("%Y-%m-%d");

    if json {
        println!(
            "{}",
            serde_json::json!({
                "deleted": removed,
                "date": date_str.to_string(),
                "remote": status,
            })
        );
    } else {
        if removed {
            println!("Deleted entry for {date_str}");
        } else {
            eprintln!("No local entry for {date_str}");
        }
        report_remote(&status);
    }

    Ok(())
}
