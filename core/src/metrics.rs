use chrono::NaiveDate;

use crate::models::{
    ChartPoint, Entry, GoalPace, Metrics, PaceAssessment, Settings, Tone, TrendPace,
};

const AVG_WINDOW: usize = 7;
const TREND_WINDOW: usize = 28;
const TREND_HALF: usize = 14;

/// Weekly loss above which a goal counts as aggressive.
const AGGRESSIVE_PER_WEEK: f64 = 1.0;
const VERY_AGGRESSIVE_PER_WEEK: f64 = 1.3;
/// Fractions of the needed pace the recent trend must reach.
const ON_PACE_RATIO: f64 = 0.9;
const BEHIND_PACE_RATIO: f64 = 0.6;

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

fn last_n(log: &[Entry], n: usize) -> &[Entry] {
    &log[log.len().saturating_sub(n)..]
}

#[allow(clippy::cast_precision_loss)]
fn steps_of(e: &Entry) -> Option<f64> {
    e.steps.map(|s| s as f64)
}

/// Derive the dashboard figures from a date-ordered log. Total over any input,
/// including an empty log.
#[must_use]
pub fn compute_metrics(log: &[Entry], settings: &Settings, today: NaiveDate) -> Metrics {
    let last7 = last_n(log, AVG_WINDOW);
    let avg7_weight = mean(last7.iter().filter_map(|e| e.weight));
    let avg7_steps = mean(last7.iter().filter_map(steps_of));

    let days_left = (settings.goal_date - today).num_days();

    let current_weight = avg7_weight
        .or_else(|| log.iter().rev().find_map(|e| e.weight))
        .unwrap_or(settings.start_weight);

    #[allow(clippy::cast_precision_loss)]
    let needed_per_week = (days_left > 0)
        .then(|| (current_weight - settings.goal_weight) / (days_left as f64 / 7.0));

    let last28 = last_n(log, TREND_WINDOW);
    let split = last28.len().saturating_sub(TREND_HALF);
    let (earlier, recent) = last28.split_at(split);
    let recent_trend_per_week = match (
        mean(earlier.iter().filter_map(|e| e.weight)),
        mean(recent.iter().filter_map(|e| e.weight)),
    ) {
        // Two weeks between the halves' centres.
        (Some(before), Some(after)) => Some((after - before) / 2.0),
        _ => None,
    };

    Metrics {
        avg7_weight,
        avg7_steps,
        days_left,
        current_weight,
        needed_per_week,
        recent_trend_per_week,
    }
}

/// Classify the goal pace and recent trend into a status tone.
#[must_use]
pub fn assess(metrics: &Metrics) -> PaceAssessment {
    let needed = metrics.needed_per_week;

    let (goal, tone) = if metrics.days_left <= 0 {
        (GoalPace::Overdue, Tone::Warn)
    } else {
        match needed {
            None => (GoalPace::Unknown, Tone::Warn),
            Some(n) if n > VERY_AGGRESSIVE_PER_WEEK => (GoalPace::VeryAggressive, Tone::Bad),
            Some(n) if n > AGGRESSIVE_PER_WEEK => (GoalPace::Aggressive, Tone::Warn),
            Some(_) => (GoalPace::Sustainable, Tone::Ok),
        }
    };

    let (trend, tone) = match (needed, metrics.recent_trend_per_week) {
        (Some(needed), Some(recent)) if metrics.days_left > 0 => {
            let loss = -recent;
            if loss >= needed * ON_PACE_RATIO {
                let tone = if tone == Tone::Bad { Tone::Warn } else { Tone::Ok };
                (TrendPace::OnPace, tone)
            } else {
                let tone = if tone == Tone::Bad { Tone::Bad } else { Tone::Warn };
                if loss >= needed * BEHIND_PACE_RATIO {
                    (TrendPace::BehindPace, tone)
                } else {
                    (TrendPace::NoTrend, tone)
                }
            }
        }
        _ => (TrendPace::InsufficientData, tone),
    };

    PaceAssessment { goal, trend, tone }
}

fn series(points: Vec<(NaiveDate, f64)>, round: fn(f64) -> f64) -> Vec<ChartPoint> {
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    points
        .into_iter()
        .enumerate()
        .map(|(i, (date, value))| {
            let window = &values[i.saturating_sub(AVG_WINDOW - 1)..=i];
            let moving_avg = mean(window.iter().copied()).map_or(value, round);
            ChartPoint {
                date,
                value,
                moving_avg,
            }
        })
        .collect()
}

/// Weight chart projection; moving average rounded to two decimals.
#[must_use]
pub fn weight_series(log: &[Entry]) -> Vec<ChartPoint> {
    let points = log
        .iter()
        .filter_map(|e| e.weight.map(|w| (e.date, w)))
        .collect();
    series(points, |v| (v * 100.0).round() / 100.0)
}

/// Steps chart projection; moving average rounded to whole steps.
#[must_use]
pub fn steps_series(log: &[Entry]) -> Vec<ChartPoint> {
    let points = log
        .iter()
        .filter_map(|e| steps_of(e).map(|s| (e.date, s)))
        .collect();
    series(points, f64::round)
}
