//! Contains logic for finding out what is in the foreground on different platforms.
//! [GenericForegroundProbe] and [GenericBrowserProbe] are the main artifacts of this module that
//! abstract the operations.

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, ConfigError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundSample {
    /// Name of the frontmost application, e.g. 'Safari', or a full path to its executable on X11.
    pub app_name: Arc<str>,
    /// Title of its focused window. For example 'bash in hello' or 'Document 1'.
    pub window_title: Arc<str>,
    /// The machine is asleep, locked or showing a screensaver.
    pub idle: bool,
}

impl ForegroundSample {
    pub fn idle() -> Self {
        Self {
            app_name: "".into(),
            window_title: "".into(),
            idle: true,
        }
    }
}

/// Intended to serve as a contract every supported platform must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ForegroundProbe {
    fn sample(&mut self) -> Result<ForegroundSample>;
}

/// Looks up the page a browser is showing.
#[cfg_attr(test, mockall::automock)]
pub trait BrowserProbe {
    /// URL of the active tab of `app_name`. `None` if the browser can't be asked.
    fn active_tab_url(&mut self, app_name: &str) -> Result<Option<String>>;
}

/// Serves as a cross-compatible [ForegroundProbe] implementation.
pub struct GenericForegroundProbe {
    inner: Box<dyn ForegroundProbe>,
}

impl GenericForegroundProbe {
    #[allow(unused_variables)]
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "macos")] {
                Ok(Self {
                    inner: Box::new(macos::AppleScriptProbe),
                })
            }
            else if #[cfg(feature = "x11")] {
                use crate::daemon::collection::afk::AfkEvaluator;
                let probe = x11::X11ForegroundProbe::new(AfkEvaluator::from_seconds(
                    config.afk_threshold_secs,
                ))
                .map_err(|e| {
                    tracing::error!("Failed to connect to X server {e:?}");
                    ConfigError::UnsupportedPlatform
                })?;
                Ok(Self {
                    inner: Box::new(probe),
                })
            }
            else {
                Err(ConfigError::UnsupportedPlatform)
            }
        }
    }
}

impl ForegroundProbe for GenericForegroundProbe {
    fn sample(&mut self) -> Result<ForegroundSample> {
        self.inner.sample()
    }
}

/// Serves as a cross-compatible [BrowserProbe] implementation. Platforms that can't talk to
/// browsers never report a URL.
pub struct GenericBrowserProbe {
    inner: Option<Box<dyn BrowserProbe>>,
}

impl GenericBrowserProbe {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "macos")] {
                Self {
                    inner: Some(Box::new(macos::AppleScriptProbe)),
                }
            }
            else {
                Self { inner: None }
            }
        }
    }
}

impl Default for GenericBrowserProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserProbe for GenericBrowserProbe {
    fn active_tab_url(&mut self, app_name: &str) -> Result<Option<String>> {
        match self.inner.as_mut() {
            Some(inner) => inner.active_tab_url(app_name),
            None => Ok(None),
        }
    }
}
