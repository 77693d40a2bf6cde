use std::{collections::HashSet, path::Path, sync::Arc};

use tracing::{trace, warn};
use url::Url;

use crate::window_api::BrowserProbe;

/// Turns the frontmost application into an activity name. For browsers that's the host of the
/// active tab, for everything else the application itself.
pub struct IdentityResolver {
    browsers: HashSet<Arc<str>>,
    browser_probe: Box<dyn BrowserProbe>,
}

impl IdentityResolver {
    pub fn new(
        browsers: impl IntoIterator<Item = Arc<str>>,
        browser_probe: Box<dyn BrowserProbe>,
    ) -> Self {
        Self {
            browsers: browsers.into_iter().collect(),
            browser_probe,
        }
    }

    /// Never returns an empty name for a non-empty `app_name`.
    pub fn resolve(&mut self, app_name: &str) -> Arc<str> {
        let app_name = clean_process_name(app_name);
        if !self.browsers.contains(app_name.as_str()) {
            return app_name.into();
        }
        match self.browser_probe.active_tab_url(&app_name) {
            Ok(Some(url)) => match host_of(&url) {
                Some(host) => return host.into(),
                None => trace!("No host in {url:?}, falling back to {app_name}"),
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to get browser URL info for {app_name}: {e:?}"),
        }
        app_name.into()
    }
}

/// Host part of `url`, if it parses and has a non-empty host.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_string())
}

/// Reduces an executable path such as `/usr/bin/nvim` to `nvim`. Plain names stay as they are.
pub fn clean_process_name(value: &str) -> String {
    let path = Path::new(value);
    if !path.is_absolute() {
        return value.to_string();
    }
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}
