use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored span of time spent on a single activity. `end` is `None` while the activity is still
/// going on.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityInterval {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub name: Arc<str>,
}

impl ActivityInterval {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// End of the interval, treating an open interval as lasting until `now`. Never earlier than
    /// `start`.
    pub fn end_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end.unwrap_or(now).max(self.start)
    }

    /// Returns the part of the interval that lies within `[from, to)` as `(start, end)`. Because
    /// the usage might happen outside of the window the result is optional.
    pub fn clamp(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start.max(from);
        let end = self.end_or(now).min(to);
        (end > start).then_some((start, end))
    }

    /// Length of the part of the interval inside `[from, to)`.
    pub fn clamped_duration(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Duration {
        self.clamp(from, to, now)
            .map_or_else(Duration::zero, |(start, end)| end - start)
    }
}

/// Represents what was in focus at a certain point in time.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Name of the activity. Empty only for idle samples.
    pub identity: Arc<str>,
    /// The machine is asleep, locked or showing a screensaver.
    pub idle: bool,
}

impl Sample {
    pub fn active(timestamp: DateTime<Utc>, identity: impl Into<Arc<str>>) -> Self {
        Self {
            timestamp,
            identity: identity.into(),
            idle: false,
        }
    }

    pub fn idle(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            identity: "".into(),
            idle: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use super::ActivityInterval;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
        )
    }

    fn interval(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ActivityInterval {
        ActivityInterval {
            id: 1,
            start,
            end,
            name: "A".into(),
        }
    }

    #[test]
    fn clamps_to_window() {
        let value = interval(at(10, 0), Some(at(10, 30)));
        assert_eq!(
            value.clamped_duration(at(10, 10), at(10, 20), at(12, 0)),
            Duration::minutes(10)
        );
    }

    #[test]
    fn open_interval_runs_until_now() {
        let value = interval(at(10, 0), None);
        assert_eq!(
            value.clamped_duration(at(9, 0), at(11, 0), at(10, 45)),
            Duration::minutes(45)
        );
    }

    #[test]
    fn outside_of_window_is_empty() {
        let value = interval(at(8, 0), Some(at(9, 0)));
        assert_eq!(value.clamp(at(9, 0), at(10, 0), at(12, 0)), None);
        assert_eq!(
            value.clamped_duration(at(10, 0), at(11, 0), at(12, 0)),
            Duration::zero()
        );
    }
}
