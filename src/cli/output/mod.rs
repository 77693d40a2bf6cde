//! Turning stored intervals into something a person can read.

pub mod analysis;
pub mod render;

use chrono::{DateTime, Duration, Utc};

/// Half-open `[start, end)` range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn length(&self) -> Duration {
        (self.end - self.start).max(Duration::zero())
    }
}
