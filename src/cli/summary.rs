use std::{fmt::Display, path::Path};

use anyhow::Result;
use chrono::{DateTime, Duration, Local, Utc};
use chrono_english::parse_date_string;
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{debug, info};

use crate::{
    config::{Config, ConfigError, IdlePolicy},
    daemon::storage::{
        StoreError,
        interval_store::{IntervalStore, SqliteIntervalStore},
    },
    utils::percentage::Percentage,
};

use super::output::{
    ReportWindow,
    analysis::{Report, SummaryOptions, summarize},
    render::{render_json, render_report},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("window").required(true).args(["hours", "minutes", "since"])))]
pub struct SummaryCommand {
    #[arg(long, help = "Summarize the last N hours")]
    hours: Option<u32>,
    #[arg(long, help = "Summarize the last N minutes")]
    minutes: Option<u32>,
    #[arg(
        long,
        help = "Start of the window. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    since: Option<String>,
    #[arg(long, help = "End of the window. Defaults to now")]
    until: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
    #[arg(long, help = "Override the configured handling of lock screen time")]
    idle_policy: Option<IdlePolicy>,
    #[arg(
        short = 'p',
        long = "percentage",
        help = "Hide activities with a smaller share of tracked time"
    )]
    min_percentage: Option<Percentage>,
}

/// Resolves the window a `summary` command asks for. The end never lies in the future.
pub fn parse_window(
    command: &SummaryCommand,
    now: DateTime<Utc>,
) -> Result<(ReportWindow, String), ConfigError> {
    let dialect: chrono_english::Dialect = command.date_style.into();
    let parse = |value: &str, what: &str| {
        parse_date_string(value, now.with_timezone(&Local), dialect)
            .map(|v| v.with_timezone(&Utc))
            .map_err(|e| ConfigError::InvalidWindow(format!("can't parse {what} {value:?}: {e}")))
    };

    let end = match &command.until {
        Some(until) => parse(until, "end")?.min(now),
        None => now,
    };

    let lookback = |length: Option<Duration>| {
        length
            .and_then(|length| end.checked_sub_signed(length))
            .ok_or_else(|| ConfigError::InvalidWindow("the window reaches too far back".into()))
    };

    let (start, label) = match (command.hours, command.minutes, &command.since) {
        (Some(0), None, None) | (None, Some(0), None) => {
            return Err(ConfigError::InvalidWindow(
                "the window must not be empty".into(),
            ));
        }
        (Some(hours), None, None) => (
            lookback(Duration::try_hours(hours.into()))?,
            format!("last {hours} hours"),
        ),
        (None, Some(minutes), None) => (
            lookback(Duration::try_minutes(minutes.into()))?,
            format!("last {minutes} minutes"),
        ),
        (None, None, Some(since)) => (parse(since, "start")?, format!("since {since}")),
        _ => {
            return Err(ConfigError::InvalidWindow(
                "exactly one of --hours, --minutes or --since is required".into(),
            ));
        }
    };

    if start >= end {
        return Err(ConfigError::InvalidWindow(format!(
            "start {start} is not before end {end}"
        )));
    }
    Ok((ReportWindow { start, end }, label))
}

/// Loads the intervals overlapping `window` and summarizes them, noting what is being recorded
/// right now.
pub async fn build_report(
    store: &impl IntervalStore,
    window: &ReportWindow,
    now: DateTime<Utc>,
    options: &SummaryOptions,
) -> Result<Report, StoreError> {
    let intervals = store.intervals_overlapping(window.start, window.end).await?;
    debug!("Summarizing {} intervals", intervals.len());
    let mut report = summarize(&intervals, window, now, options);
    report.current_activity = store.open_interval().await?.map(|open| open.name);
    Ok(report)
}

/// Command to process `summary`. Prints where the time within the requested window went.
pub async fn process_summary_command(
    command: SummaryCommand,
    app_dir: &Path,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let (window, label) = parse_window(&command, now)?;

    let mut options = SummaryOptions::from_config(config)?;
    if let Some(policy) = command.idle_policy {
        options.idle_policy = policy;
    }
    if let Some(min_percentage) = command.min_percentage {
        options.min_percentage = min_percentage;
    }

    let database_path = config.database_path(app_dir);
    info!("Reading activity from {database_path:?}");
    let store = SqliteIntervalStore::open(&database_path)?;
    let report = build_report(&store, &window, now, &options).await?;

    if command.json {
        println!("{}", render_json(&report)?);
    } else {
        print!("{}", render_report(&report, &label)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use clap::Parser;

    use crate::{
        cli::output::analysis::SummaryOptions,
        config::{Config, ConfigError},
        daemon::storage::interval_store::{IntervalStore, SqliteIntervalStore},
    };

    use super::{SummaryCommand, build_report, parse_window};

    fn now() -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    fn command(args: &[&str]) -> SummaryCommand {
        SummaryCommand::try_parse_from(std::iter::once("summary").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn hours_window_ends_now() {
        let (window, label) = parse_window(&command(&["--hours", "2"]), now()).unwrap();
        assert_eq!(window.start, now() - Duration::hours(2));
        assert_eq!(window.end, now());
        assert_eq!(label, "last 2 hours");
    }

    #[test]
    fn minutes_window() {
        let (window, _) = parse_window(&command(&["--minutes", "45"]), now()).unwrap();
        assert_eq!(window.length(), Duration::minutes(45));
    }

    #[test]
    fn relative_since() {
        let (window, _) = parse_window(&command(&["--since", "1 hour ago"]), now()).unwrap();
        let expected = now() - Duration::hours(1);
        assert!((window.start - expected).num_seconds().abs() < 60);
        assert_eq!(window.end, now());
    }

    #[test]
    fn window_arguments_are_exclusive() {
        assert!(SummaryCommand::try_parse_from(["summary"]).is_err());
        assert!(
            SummaryCommand::try_parse_from(["summary", "--hours", "1", "--minutes", "5"]).is_err()
        );
    }

    #[test]
    fn empty_windows_are_rejected() {
        assert!(matches!(
            parse_window(&command(&["--hours", "0"]), now()),
            Err(ConfigError::InvalidWindow(_))
        ));
        assert!(matches!(
            parse_window(&command(&["--since", "not a date at all"]), now()),
            Err(ConfigError::InvalidWindow(_))
        ));
    }

    #[test]
    fn window_before_representable_time_is_rejected() {
        assert!(matches!(
            parse_window(&command(&["--hours", "4294967295"]), now()),
            Err(ConfigError::InvalidWindow(_))
        ));
        assert!(parse_window(&command(&["--minutes", "4294967295"]), now()).is_ok());
    }

    #[tokio::test]
    async fn report_from_store() -> Result<()> {
        let store = SqliteIntervalStore::open_in_memory()?;
        store
            .insert_open_interval(now() - Duration::minutes(90), "github.com".into())
            .await?;
        store.close_open_interval(now() - Duration::minutes(50)).await?;
        store
            .insert_open_interval(now() - Duration::minutes(20), "Terminal".into())
            .await?;

        let (window, _) = parse_window(&command(&["--hours", "1"]), now())?;
        let options = SummaryOptions::from_config(&Config::default())?;
        let report = build_report(&store, &window, now(), &options).await?;

        assert_eq!(report.total_tracked, Duration::minutes(30));
        assert_eq!(report.gap_time, Duration::minutes(30));
        let names = report.activities.iter().map(|v| &*v.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["Terminal", "github.com"]);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].duration, Duration::minutes(30));
        assert_eq!(report.current_activity.as_deref(), Some("Terminal"));

        store.close_open_interval(now()).await?;
        let report = build_report(&store, &window, now(), &options).await?;
        assert_eq!(report.current_activity, None);
        Ok(())
    }
}
