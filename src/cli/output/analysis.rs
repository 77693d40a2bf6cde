use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    config::{Config, ConfigError, IdlePolicy},
    daemon::storage::entities::ActivityInterval,
    utils::{
        percentage::{Percentage, duration_percentage},
        time::duration_ser,
    },
};

use super::ReportWindow;

/// Knobs of [summarize].
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub min_percentage: Percentage,
    pub idle_names: HashSet<Arc<str>>,
    pub idle_policy: IdlePolicy,
    pub gap_threshold: Duration,
}

impl SummaryOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            min_percentage: config.min_percentage,
            idle_names: config.idle_activity_names.iter().cloned().collect(),
            idle_policy: config.idle_policy,
            gap_threshold: config.gap_threshold()?,
        })
    }

    fn counts_as_activity(&self, name: &str) -> bool {
        match self.idle_policy {
            IdlePolicy::Itemize => true,
            IdlePolicy::Gap => !self.idle_names.contains(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityUsage {
    pub name: Arc<str>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
    /// Share of tracked time, not of the window.
    #[serde(rename = "pct")]
    pub percentage: Percentage,
}

/// A break between two consecutive activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

/// Where the time within a window went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub total_tracked: Duration,
    /// Time of the window no activity accounts for.
    #[serde(with = "duration_ser")]
    pub gap_time: Duration,
    /// Tracked share of the window.
    pub coverage: Option<Percentage>,
    /// Activities by descending duration. Those under the cut-off are left out.
    #[serde(rename = "per_activity")]
    pub activities: Vec<ActivityUsage>,
    /// How many activities fell under the cut-off.
    pub hidden_activities: usize,
    /// Gaps longer than the threshold, largest first.
    pub gaps: Vec<Gap>,
    /// Sum of [Report::gaps]. Most likely the machine was asleep or locked.
    #[serde(with = "duration_ser")]
    pub likely_asleep: Duration,
    pub first_start: Option<DateTime<Utc>>,
    pub last_end: Option<DateTime<Utc>>,
    /// Activity the monitor is recording right now, if any.
    pub current_activity: Option<Arc<str>>,
}

impl Report {
    /// False when nothing was tracked. Percentages are meaningless then.
    pub fn has_data(&self) -> bool {
        self.total_tracked > Duration::zero()
    }
}

/// Clips `intervals` to `window`, open ones running until `now`, and accounts the time per
/// activity. Intervals don't need to be sorted.
pub fn summarize(
    intervals: &[ActivityInterval],
    window: &ReportWindow,
    now: DateTime<Utc>,
    options: &SummaryOptions,
) -> Report {
    let mut clipped = intervals
        .iter()
        .filter(|interval| options.counts_as_activity(&interval.name))
        .filter_map(|interval| {
            interval
                .clamp(window.start, window.end, now)
                .map(|(start, end)| (interval.name.clone(), start, end))
        })
        .collect::<Vec<_>>();
    clipped.sort_by_key(|(_, start, _)| *start);

    let mut totals = HashMap::<Arc<str>, Duration>::new();
    let mut gaps = vec![];
    let mut last_end: Option<DateTime<Utc>> = None;
    for (name, start, end) in &clipped {
        *totals.entry(name.clone()).or_insert_with(Duration::zero) += *end - *start;
        if let Some(previous_end) = last_end {
            if *start - previous_end > options.gap_threshold {
                gaps.push(Gap {
                    from: previous_end,
                    to: *start,
                    duration: *start - previous_end,
                });
            }
        }
        last_end = Some(last_end.map_or(*end, |previous_end| previous_end.max(*end)));
    }

    let total_tracked = totals.values().fold(Duration::zero(), |sum, v| sum + *v);
    let gap_time = (window.length() - total_tracked).max(Duration::zero());

    let mut ranked = totals.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));
    let ranked_count = ranked.len();
    let activities = ranked
        .into_iter()
        .filter_map(|(name, duration)| {
            let percentage = duration_percentage(duration, total_tracked)?;
            (percentage >= options.min_percentage).then_some(ActivityUsage {
                name,
                duration,
                percentage,
            })
        })
        .collect::<Vec<_>>();

    gaps.sort_by(|a: &Gap, b: &Gap| b.duration.cmp(&a.duration).then(a.from.cmp(&b.from)));
    let likely_asleep = gaps
        .iter()
        .fold(Duration::zero(), |sum, gap| sum + gap.duration);

    Report {
        window_start: window.start,
        window_end: window.end,
        total_tracked,
        gap_time,
        coverage: duration_percentage(total_tracked, window.length()),
        hidden_activities: ranked_count - activities.len(),
        activities,
        gaps,
        likely_asleep,
        first_start: clipped.first().map(|(_, start, _)| *start),
        last_end,
        current_activity: None,
    }
}
