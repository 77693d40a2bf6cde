//! Configuration loading and management.
//!
//! The configuration lives in `<application dir>/config.json`. Every field has a default, so a
//! missing file or a partial file are both fine.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::Duration;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::utils::percentage::{DEFAULT_REPORT_CUTOFF, Percentage};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "tracker.db";
const MAX_SAMPLE_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Errors that prevent the monitor or a report from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("unable to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unable to write config file {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    /// Report window arguments are missing, conflicting or unparsable.
    #[error("invalid report window: {0}")]
    InvalidWindow(String),
    #[error("no foreground probe is available for this platform")]
    UnsupportedPlatform,
    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

/// What the report does with activities named in [Config::idle_activity_names].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdlePolicy {
    /// Time spent on the lock screen is treated like time the machine was asleep.
    #[default]
    Gap,
    /// Lock screen is reported like any other activity.
    Itemize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where intervals are stored. Defaults to `tracker.db` in the application directory.
    pub database_path: Option<PathBuf>,
    pub sample_interval_ms: u64,
    /// Upper bound on how long an interval left open by a crash is assumed to have lasted.
    pub recovery_window_secs: i64,
    /// Breaks between intervals longer than this are reported as gaps.
    pub gap_threshold_secs: i64,
    /// Activities with a smaller share of tracked time are left out of the report.
    pub min_percentage: Percentage,
    pub idle_activity_names: Vec<Arc<str>>,
    pub idle_policy: IdlePolicy,
    /// Applications whose active tab's host is used as the activity name.
    pub browsers: Vec<Arc<str>>,
    /// Used by probes that only know the time since last input.
    pub afk_threshold_secs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            sample_interval_ms: 1000,
            recovery_window_secs: 5 * 60,
            gap_threshold_secs: 10 * 60,
            min_percentage: DEFAULT_REPORT_CUTOFF,
            idle_activity_names: vec!["loginwindow".into()],
            idle_policy: IdlePolicy::Gap,
            browsers: ["Arc", "Google Chrome", "Safari", "Brave Browser", "Firefox"]
                .into_iter()
                .map(Arc::from)
                .collect(),
            afk_threshold_secs: 2 * 60,
        }
    }
}

impl Config {
    pub fn path_in(app_dir: &Path) -> PathBuf {
        app_dir.join(CONFIG_FILE_NAME)
    }

    /// Loads `config.json` from `app_dir`, falling back to defaults when there is none.
    pub fn load(app_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(app_dir);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {path:?}, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config: Self =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that are only interpreted later, so a bad file fails before anything
    /// starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_ms > MAX_SAMPLE_INTERVAL_MS {
            return Err(ConfigError::OutOfRange {
                field: "sample_interval_ms",
                value: i64::try_from(self.sample_interval_ms).unwrap_or(i64::MAX),
            });
        }
        self.recovery_window()?;
        self.gap_threshold()?;
        Ok(())
    }

    pub fn save(&self, app_dir: &Path) -> Result<(), ConfigError> {
        let path = Self::path_in(app_dir);
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, data).map_err(|source| ConfigError::Write { path, source })
    }

    pub fn database_path(&self, app_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| app_dir.join(DATABASE_FILE_NAME))
    }

    pub fn sample_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn recovery_window(&self) -> Result<Duration, ConfigError> {
        seconds("recovery_window_secs", self.recovery_window_secs)
    }

    pub fn gap_threshold(&self) -> Result<Duration, ConfigError> {
        seconds("gap_threshold_secs", self.gap_threshold_secs)
    }
}

fn seconds(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    Duration::try_seconds(value.max(0)).ok_or(ConfigError::OutOfRange { field, value })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{Config, ConfigError, IdlePolicy};

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load(dir.path())?;
        assert_eq!(config, Config::default());
        assert_eq!(config.database_path(dir.path()), dir.path().join("tracker.db"));
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            Config::path_in(dir.path()),
            r#"{ "idle_policy": "itemize", "gap_threshold_secs": 60 }"#,
        )?;
        let config = Config::load(dir.path())?;
        assert_eq!(config.idle_policy, IdlePolicy::Itemize);
        assert_eq!(config.gap_threshold_secs, 60);
        assert_eq!(config.sample_interval_ms, 1000);
        assert_eq!(&*config.idle_activity_names[0], "loginwindow");
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = tempdir()?;
        let config = Config {
            database_path: Some(dir.path().join("other.db")),
            ..Config::default()
        };
        config.save(dir.path())?;
        assert_eq!(Config::load(dir.path())?, config);
        Ok(())
    }

    #[test]
    fn test_broken_file_is_reported() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(Config::path_in(dir.path()), "{ not json")?;
        assert!(matches!(
            Config::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_huge_durations_are_rejected() -> Result<()> {
        let config = Config {
            gap_threshold_secs: i64::MAX,
            ..Config::default()
        };
        assert!(matches!(
            config.gap_threshold(),
            Err(ConfigError::OutOfRange {
                field: "gap_threshold_secs",
                ..
            })
        ));

        let dir = tempdir()?;
        std::fs::write(
            Config::path_in(dir.path()),
            r#"{ "recovery_window_secs": 9223372036854775807 }"#,
        )?;
        assert!(matches!(
            Config::load(dir.path()),
            Err(ConfigError::OutOfRange {
                field: "recovery_window_secs",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_sample_interval_is_bounded() {
        let config = Config {
            sample_interval_ms: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "sample_interval_ms",
                ..
            })
        ));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_negative_durations_mean_zero() -> Result<()> {
        let config = Config {
            recovery_window_secs: -5,
            ..Config::default()
        };
        assert_eq!(config.recovery_window()?, chrono::Duration::zero());
        Ok(())
    }

    #[test]
    fn test_negative_percentage_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(Config::path_in(dir.path()), r#"{ "min_percentage": -3 }"#)?;
        assert!(Config::load(dir.path()).is_err());
        Ok(())
    }
}
