use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GOAL_WEIGHT: f64 = 85.0;
pub const DEFAULT_START_WEIGHT: f64 = 105.0;
pub const DEFAULT_GOAL_DATE: (i32, u32, u32) = (2026, 6, 4);

/// Version tag written into JSON backups.
pub const EXPORT_VERSION: &str = "v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkoutType {
    #[default]
    None,
    StrengthA,
    StrengthB,
    Walk,
    Run,
    Bike,
    Mobility,
    Other,
}

pub const WORKOUT_TYPES: &[WorkoutType] = &[
    WorkoutType::None,
    WorkoutType::StrengthA,
    WorkoutType::StrengthB,
    WorkoutType::Walk,
    WorkoutType::Run,
    WorkoutType::Bike,
    WorkoutType::Mobility,
    WorkoutType::Other,
];

impl WorkoutType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::StrengthA => "strengthA",
            Self::StrengthB => "strengthB",
            Self::Walk => "walk",
            Self::Run => "run",
            Self::Bike => "bike",
            Self::Mobility => "mobility",
            Self::Other => "other",
        }
    }

    /// Human label for tables. `none` renders as an empty cell.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "",
            Self::StrengthA => "Strength A",
            Self::StrengthB => "Strength B",
            Self::Walk => "Walk",
            Self::Run => "Run",
            Self::Bike => "Bike",
            Self::Mobility => "Mobility",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkoutType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        WORKOUT_TYPES
            .iter()
            .copied()
            .find(|w| w.as_str().to_lowercase() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = WORKOUT_TYPES.iter().map(|w| w.as_str()).collect();
                anyhow::anyhow!(
                    "Invalid workout type '{s}'. Must be one of: {}",
                    names.join(", ")
                )
            })
    }
}

/// One calendar day's recorded metrics. `date` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub date: NaiveDate,
    pub weight: Option<f64>,
    pub steps: Option<u64>,
    #[serde(default)]
    pub workout_type: WorkoutType,
    pub workout_min: Option<f64>,
    pub workout_rpe: Option<f64>,
    pub extras: Option<f64>,
    pub sleep: Option<f64>,
    #[serde(default)]
    pub notes: String,
    /// `None` means never explicitly timestamped; compares as the epoch.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            weight: None,
            steps: None,
            workout_type: WorkoutType::None,
            workout_min: None,
            workout_rpe: None,
            extras: None,
            sleep: None,
            notes: String::new(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub goal_weight: f64,
    pub goal_date: NaiveDate,
    pub start_weight: f64,
    pub start_date: NaiveDate,
}

impl Settings {
    #[must_use]
    pub fn defaults(today: NaiveDate) -> Self {
        let (y, m, d) = DEFAULT_GOAL_DATE;
        Self {
            goal_weight: DEFAULT_GOAL_WEIGHT,
            goal_date: NaiveDate::from_ymd_opt(y, m, d).unwrap_or(today),
            start_weight: DEFAULT_START_WEIGHT,
            start_date: today,
        }
    }
}

// --- Remote collaborator types ---

/// Shadow of an [`Entry`] held by the remote row store, keyed by `(user, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub date: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// The authenticated principal as reported by the remote identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pulled: usize,
    pub merged: usize,
    pub pushed: usize,
}

/// Outcome of a remote operation. Failures never roll back local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteStatus {
    NotConfigured,
    NotAuthenticated,
    AlreadyRunning,
    Synced(SyncReport),
    Pushed,
    Deleted,
    Failed { error: String },
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("remote sync not configured"),
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::AlreadyRunning => f.write_str("a sync is already in progress"),
            Self::Synced(r) => write!(
                f,
                "sync ok ({} pulled, {} merged, {} pushed)",
                r.pulled, r.merged, r.pushed
            ),
            Self::Pushed => f.write_str("pushed to remote"),
            Self::Deleted => f.write_str("deleted on remote"),
            Self::Failed { error } => write!(f, "sync failed: {error}"),
        }
    }
}

// --- Metrics types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub avg7_weight: Option<f64>,
    pub avg7_steps: Option<f64>,
    pub days_left: i64,
    pub current_weight: f64,
    pub needed_per_week: Option<f64>,
    pub recent_trend_per_week: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPace {
    Overdue,
    Unknown,
    Sustainable,
    Aggressive,
    VeryAggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendPace {
    OnPace,
    BehindPace,
    NoTrend,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Ok,
    Warn,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaceAssessment {
    pub goal: GoalPace,
    pub trend: TrendPace,
    pub tone: Tone,
}

/// One point of a chart projection with its trailing 7-point moving average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub moving_avg: f64,
}

// --- Export / Import types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub exported_at: String,
    pub settings: Settings,
    pub entries: Vec<Entry>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub entries_imported: usize,
    pub settings_imported: bool,
}

// --- Validation (CLI input boundary; the normalizer itself is permissive) ---

pub fn validate_entry(entry: &Entry) -> Result<()> {
    if entry.weight.is_some_and(|w| !w.is_finite() || w <= 0.0) {
        bail!("Weight must be greater than 0");
    }
    if entry.workout_min.is_some_and(|m| !m.is_finite() || m < 0.0) {
        bail!("Workout minutes must not be negative");
    }
    if let Some(rpe) = entry.workout_rpe {
        if !(0.0..=10.0).contains(&rpe) {
            bail!("Workout RPE must be between 0 and 10");
        }
    }
    if let Some(sleep) = entry.sleep {
        if !(0.0..=24.0).contains(&sleep) {
            bail!("Sleep must be between 0 and 24 hours");
        }
    }
    if entry.extras.is_some_and(|x| !x.is_finite()) {
        bail!("Extras must be a finite number");
    }
    Ok(())
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if !settings.goal_weight.is_finite() || settings.goal_weight <= 0.0 {
        bail!("Goal weight must be greater than 0");
    }
    if !settings.start_weight.is_finite() || settings.start_weight <= 0.0 {
        bail!("Start weight must be greater than 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_workout_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&WorkoutType::StrengthA).unwrap(),
            "\"strengthA\""
        );
        assert_eq!(serde_json::to_string(&WorkoutType::None).unwrap(), "\"none\"");
        let w: WorkoutType = serde_json::from_str("\"mobility\"").unwrap();
        assert_eq!(w, WorkoutType::Mobility);
    }

    #[test]
    fn test_workout_type_from_str() {
        assert_eq!("strengthB".parse::<WorkoutType>().unwrap(), WorkoutType::StrengthB);
        assert_eq!("STRENGTHA".parse::<WorkoutType>().unwrap(), WorkoutType::StrengthA);
        assert_eq!(" run ".parse::<WorkoutType>().unwrap(), WorkoutType::Run);
        assert!("swim".parse::<WorkoutType>().is_err());
    }

    #[test]
    fn test_workout_type_label() {
        assert_eq!(WorkoutType::None.label(), "");
        assert_eq!(WorkoutType::StrengthA.label(), "Strength A");
        assert_eq!(WorkoutType::Bike.to_string(), "bike");
    }

    #[test]
    fn test_entry_serializes_camel_case_with_nulls() {
        let mut e = Entry::new(day(5));
        e.weight = Some(99.5);
        e.workout_type = WorkoutType::Walk;
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["date"], "2025-01-05");
        assert_eq!(json["weight"], 99.5);
        assert!(json["steps"].is_null());
        assert_eq!(json["workoutType"], "walk");
        assert!(json["workoutMin"].is_null());
        assert_eq!(json["notes"], "");
        assert!(json["updatedAt"].is_null());
    }

    #[test]
    fn test_settings_defaults() {
        let s = Settings::defaults(day(1));
        assert!((s.goal_weight - 85.0).abs() < f64::EPSILON);
        assert!((s.start_weight - 105.0).abs() < f64::EPSILON);
        assert_eq!(s.goal_date, NaiveDate::from_ymd_opt(2026, 6, 4).unwrap());
        assert_eq!(s.start_date, day(1));
    }

    #[test]
    fn test_validate_entry_valid() {
        let mut e = Entry::new(day(1));
        e.weight = Some(80.0);
        e.workout_rpe = Some(7.0);
        e.sleep = Some(7.5);
        e.extras = Some(-2.0);
        assert!(validate_entry(&e).is_ok());
        assert!(validate_entry(&Entry::new(day(2))).is_ok());
    }

    #[test]
    fn test_validate_entry_bad_weight() {
        let mut e = Entry::new(day(1));
        e.weight = Some(0.0);
        assert!(validate_entry(&e).is_err());
        e.weight = Some(-3.0);
        assert!(validate_entry(&e).is_err());
    }

    #[test]
    fn test_validate_entry_ranges() {
        let mut e = Entry::new(day(1));
        e.workout_rpe = Some(11.0);
        assert!(validate_entry(&e).is_err());

        let mut e = Entry::new(day(1));
        e.sleep = Some(25.0);
        assert!(validate_entry(&e).is_err());

        let mut e = Entry::new(day(1));
        e.workout_min = Some(-1.0);
        assert!(validate_entry(&e).is_err());
    }

    #[test]
    fn test_validate_settings() {
        let mut s = Settings::defaults(day(1));
        assert!(validate_settings(&s).is_ok());
        s.goal_weight = 0.0;
        assert!(validate_settings(&s).is_err());
        s.goal_weight = 80.0;
        s.start_weight = -1.0;
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    fn test_remote_status_display() {
        let status = RemoteStatus::Synced(SyncReport {
            pulled: 3,
            merged: 5,
            pushed: 5,
        });
        assert_eq!(status.to_string(), "sync ok (3 pulled, 5 merged, 5 pushed)");
        assert_eq!(
            RemoteStatus::Failed {
                error: "timeout".into()
            }
            .to_string(),
            "sync failed: timeout"
        );
    }
}
