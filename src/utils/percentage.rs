use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Non-negative percentage. Used both for report shares and for the report cut-off.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percentage(f64);

/// Activities below this share of tracked time are left out of reports by default.
pub const DEFAULT_REPORT_CUTOFF: Percentage = Percentage(0.5);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value.is_nan() || value < 0. {
            None
        } else {
            Some(Percentage(value))
        }
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // This means that 100%% also works, but I think I'm fine with that
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl TryFrom<f64> for Percentage {
    type Error = anyhow::Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Percentage::new_opt(value).ok_or_else(|| anyhow!("{value} is not a valid percentage"))
    }
}

impl From<Percentage> for f64 {
    fn from(value: Percentage) -> Self {
        value.0
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `value` in `whole`. `None` when `whole` has no length, so callers never print NaN.
pub fn duration_percentage(value: Duration, whole: Duration) -> Option<Percentage> {
    if whole <= Duration::zero() {
        return None;
    }
    Percentage::new_opt(value.num_milliseconds() as f64 / whole.num_milliseconds() as f64 * 100.)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{Percentage, duration_percentage};

    #[test]
    fn parses_with_and_without_sign() {
        assert_eq!(*"0.5%".parse::<Percentage>().unwrap(), 0.5);
        assert_eq!(*"12".parse::<Percentage>().unwrap(), 12.);
        assert!("-1".parse::<Percentage>().is_err());
    }

    #[test]
    fn share_of_empty_whole_is_none() {
        assert_eq!(duration_percentage(Duration::minutes(5), Duration::zero()), None);
        assert_eq!(
            duration_percentage(Duration::minutes(15), Duration::hours(1)).map(|v| *v),
            Some(25.)
        );
    }
}
