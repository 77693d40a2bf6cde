use std::fmt::{self, Write};

use ansi_term::{Colour, Style};
use anyhow::Result;

use crate::utils::time::{format_duration, format_moment, truncate_name};

use super::analysis::Report;

const BAR_WIDTH: usize = 50;
const NAME_WIDTH: usize = 30;
const SHOWN_GAPS: usize = 5;

/// Renders `report` as a colored table for the terminal. `label` names the window, for example
/// "last 2 hours".
pub fn render_report(report: &Report, label: &str) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let heading = Style::new().bold();
    let dim = Colour::Fixed(244);

    writeln!(
        out,
        "{} {}",
        heading.paint("Activity summary"),
        dim.paint(format!(
            "({label}: {} .. {})",
            format_moment(report.window_start),
            format_moment(report.window_end)
        ))
    )?;
    writeln!(out)?;

    if !report.has_data() {
        writeln!(
            out,
            "{}",
            Colour::Yellow.paint("No data recorded in this window.")
        )?;
        return Ok(out);
    }

    let metric = |out: &mut String, name: &str, value: String| {
        writeln!(out, "  {:<16}{}", name, Colour::Cyan.paint(value))
    };
    metric(&mut out, "Tracked", format_duration(report.total_tracked))?;
    metric(&mut out, "Untracked", format_duration(report.gap_time))?;
    if let Some(coverage) = report.coverage {
        metric(&mut out, "Coverage", coverage.to_string())?;
    }
    metric(&mut out, "Likely asleep", format_duration(report.likely_asleep))?;
    if let (Some(first), Some(last)) = (report.first_start, report.last_end) {
        metric(&mut out, "First activity", format_moment(first))?;
        metric(&mut out, "Last activity", format_moment(last))?;
    }
    if let Some(current) = &report.current_activity {
        metric(&mut out, "Now", current.to_string())?;
    }

    if !report.gaps.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "{} {}",
            heading.paint("Gaps"),
            dim.paint(format!("({} total)", report.gaps.len()))
        )?;
        for gap in report.gaps.iter().take(SHOWN_GAPS) {
            writeln!(
                out,
                "  {} .. {}  {}",
                format_moment(gap.from),
                format_moment(gap.to),
                Colour::Red.paint(format_duration(gap.duration))
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", heading.paint("Activities"))?;
    for activity in &report.activities {
        let filled = ((*activity.percentage / 100.) * BAR_WIDTH as f64).round() as usize;
        let bar = "█".repeat(filled.min(BAR_WIDTH));
        writeln!(
            out,
            "  {:<width$} {:>9} {:>8}  {}",
            truncate_name(&activity.name, NAME_WIDTH),
            format_duration(activity.duration),
            activity.percentage.to_string(),
            Colour::Green.paint(bar),
            width = NAME_WIDTH
        )?;
    }
    if report.hidden_activities > 0 {
        writeln!(
            out,
            "  {}",
            dim.paint(format!(
                "{} more below the cut-off",
                report.hidden_activities
            ))
        )?;
    }
    Ok(out)
}

pub fn render_json(report: &Report) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use crate::{
        cli::output::{
            ReportWindow,
            analysis::{SummaryOptions, summarize},
        },
        config::Config,
        daemon::storage::entities::ActivityInterval,
    };

    use super::{render_json, render_report};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
        )
    }

    fn interval(name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ActivityInterval {
        ActivityInterval {
            id: 0,
            start,
            end: Some(end),
            name: Arc::from(name),
        }
    }

    fn window() -> ReportWindow {
        ReportWindow {
            start: at(8, 0),
            end: at(12, 0),
        }
    }

    #[test]
    fn empty_report_says_so() {
        let options = SummaryOptions::from_config(&Config::default()).unwrap();
        let report = summarize(&[], &window(), at(13, 0), &options);
        let rendered = render_report(&report, "last 4 hours").unwrap();
        assert!(rendered.contains("No data recorded"));
        assert!(!rendered.contains("Activities"));
    }

    #[test]
    fn shows_only_top_gaps() {
        let options = SummaryOptions::from_config(&Config::default()).unwrap();
        let intervals = (0..8)
            .map(|i| {
                let start = at(8, 0) + Duration::minutes(30 * i);
                interval("a-very-long-hostname-that-does-not-fit.example.com", start, start + Duration::minutes(5))
            })
            .collect::<Vec<_>>();
        let report = summarize(&intervals, &window(), at(13, 0), &options);
        assert_eq!(report.gaps.len(), 7);

        let rendered = render_report(&report, "last 4 hours").unwrap();
        assert!(rendered.contains("(7 total)"));
        assert_eq!(rendered.matches("25m0s").count(), 5);
        assert!(rendered.contains("a-very-long-hostname-that-d..."));
        assert!(rendered.contains(&"█".repeat(50)));
    }

    #[test]
    fn names_the_current_activity() {
        let options = SummaryOptions::from_config(&Config::default()).unwrap();
        let mut report = summarize(
            &[interval("github.com", at(9, 0), at(9, 30))],
            &window(),
            at(13, 0),
            &options,
        );
        assert!(!render_report(&report, "today").unwrap().contains("Now"));

        report.current_activity = Some("Terminal".into());
        let rendered = render_report(&report, "today").unwrap();
        assert!(rendered.contains("Now"));
        assert!(rendered.contains("Terminal"));
    }

    #[test]
    fn json_uses_seconds() -> anyhow::Result<()> {
        let options = SummaryOptions::from_config(&Config::default()).unwrap();
        let report = summarize(
            &[interval("github.com", at(9, 0), at(9, 30))],
            &window(),
            at(13, 0),
            &options,
        );
        let json: serde_json::Value = serde_json::from_str(&render_json(&report)?)?;
        assert_eq!(json["total_tracked"], 1800);
        assert_eq!(json["per_activity"][0]["name"], "github.com");
        assert_eq!(json["per_activity"][0]["pct"], 100.0);
        Ok(())
    }
}
