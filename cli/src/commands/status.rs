use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use habitlog_core::models::{ChartPoint, GoalPace, Tone, TrendPace};
use habitlog_core::service::LogService;

use super::helpers::{fmt_opt, no_neg_zero, today};

fn headline(goal: GoalPace) -> &'static str {
    match goal {
        GoalPace::Overdue => "Goal date has passed",
        GoalPace::Unknown => "Slight adjustment recommended",
        GoalPace::Sustainable => "Sustainable pace",
        GoalPace::Aggressive => "Aggressive goal",
        GoalPace::VeryAggressive => "Very aggressive goal",
    }
}

fn detail(trend: TrendPace) -> &'static str {
    match trend {
        TrendPace::OnPace => "You are at or above the required pace. Stay consistent.",
        TrendPace::BehindPace => {
            "You are below the required pace. Cutting extras or adding steps helps most."
        }
        TrendPace::NoTrend => "Not enough of a trend yet. Keep logging and reduce extras.",
        TrendPace::InsufficientData => "Log at least 7-14 days for a reliable trend.",
    }
}

fn tone_tag(tone: Tone) -> &'static str {
    match tone {
        Tone::Ok => "[ok]",
        Tone::Warn => "[warn]",
        Tone::Bad => "[bad]",
    }
}

pub(crate) fn cmd_status(svc: &LogService, json: bool) -> Result<()> {
    let today = today();
    let metrics = svc.metrics(today);
    let assessment = svc.assessment(today);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "metrics": metrics,
                "assessment": assessment,
            }))?
        );
        return Ok(());
    }

    let settings = svc.settings();
    println!(
        "{} {}",
        tone_tag(assessment.tone),
        headline(assessment.goal)
    );
    if assessment.goal == GoalPace::Overdue {
        println!(
            "  Goal date {} is in the past. Update it with `habitlog settings set --goal-date`.",
            settings.goal_date.format("%Y-%m-%d")
        );
        return Ok(());
    }

    println!(
        "  Goal:           {:.1} kg by {}",
        settings.goal_weight,
        settings.goal_date.format("%Y-%m-%d")
    );
    println!("  Current weight: {:.1} kg", no_neg_zero(metrics.current_weight));
    println!("  7-day weight:   {}", or_dash(&fmt_opt(metrics.avg7_weight, 1), "kg"));
    println!("  7-day steps:    {}", or_dash(&fmt_opt(metrics.avg7_steps, 0), "steps"));
    println!("  Days left:      {}", metrics.days_left);
    println!(
        "  Needed:         {}",
        or_dash(&fmt_opt(metrics.needed_per_week, 2), "kg/week")
    );
    println!(
        "  Recent trend:   {}",
        or_dash(&fmt_opt(metrics.recent_trend_per_week, 2), "kg/week (last 14 days)")
    );
    println!("  {}", detail(assessment.trend));

    Ok(())
}

fn or_dash(value: &str, unit: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        format!("{value} {unit}")
    }
}

pub(crate) fn cmd_chart(svc: &LogService, kind: &str, json: bool) -> Result<()> {
    let (points, digits) = match kind {
        "weight" => (svc.weight_series(), 1),
        "steps" => (svc.steps_series(), 0),
        _ => bail!("Unknown chart '{kind}'. Use weight or steps"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    if points.is_empty() {
        eprintln!("No {kind} recorded yet.");
        return Ok(());
    }

    print_series(&points, digits);
    Ok(())
}

fn print_series(points: &[ChartPoint], digits: usize) {
    #[derive(Tabled)]
    struct PointRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "7-day avg")]
        moving_avg: String,
    }

    let rows: Vec<PointRow> = points
        .iter()
        .map(|p| PointRow {
            date: p.date.format("%Y-%m-%d").to_string(),
            value: fmt_opt(Some(p.value), digits),
            moving_avg: fmt_opt(Some(p.moving_avg), digits.max(1)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
