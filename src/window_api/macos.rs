use std::process::{Command, Stdio};

use anyhow::{Result, anyhow};
use tracing::{instrument, warn};

use super::{BrowserProbe, ForegroundProbe, ForegroundSample};

/// Reports the screensaver state, then the frontmost application and its window title, one per
/// line.
const FOREGROUND_SCRIPT: &str = r#"
tell application "System Events"
    set screenSaverRunning to exists process "ScreenSaverEngine"
    set frontApp to first application process whose frontmost is true
    set appName to name of frontApp
    set windowTitle to ""
    try
        set windowTitle to name of front window of frontApp
    end try
end tell
return (screenSaverRunning as text) & linefeed & appName & linefeed & windowTitle
"#;

fn tab_url_script(app_name: &str) -> Option<String> {
    match app_name {
        "Arc" | "Google Chrome" | "Brave Browser" => Some(format!(
            "tell application \"{app_name}\" to get URL of active tab of front window"
        )),
        "Safari" => Some(
            "tell application \"Safari\" to get URL of current tab of front window".to_string(),
        ),
        _ => None,
    }
}

/// Runs `program` and returns its trimmed output.
fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()?;
    if !output.status.success() {
        return Err(anyhow!(
            "{program} error: {}, stderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_apple_script(script: &str) -> Result<String> {
    run_command("osascript", &["-e", script])
}

/// Looks for `"CGSSessionScreenIsLocked" = Yes` in the IORegistry root.
fn parse_screen_locked(ioreg: &str) -> bool {
    ioreg
        .lines()
        .filter(|line| line.contains("\"CGSSessionScreenIsLocked\""))
        .any(|line| line.trim_end().ends_with("Yes"))
}

/// The display wrangler reports power state 4 while the display is on. Machines without one are
/// treated as awake.
fn parse_display_asleep(ioreg: &str) -> bool {
    const KEY: &str = "\"CurrentPowerState\"=";
    ioreg
        .find(KEY)
        .map(|index| {
            ioreg[index + KEY.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|state| state.parse::<u32>().ok())
        .is_some_and(|state| state < 4)
}

/// Locked screen or sleeping display. Failing to ask counts as neither, so the foreground script
/// still decides.
fn screen_unavailable() -> bool {
    let locked = run_command("ioreg", &["-n", "Root", "-d1"])
        .map(|output| parse_screen_locked(&output))
        .inspect_err(|e| warn!("Failed to query lock state {e:?}"))
        .unwrap_or(false);
    locked
        || run_command("ioreg", &["-n", "IODisplayWrangler", "-r", "-d1"])
            .map(|output| parse_display_asleep(&output))
            .unwrap_or(false)
}

fn parse_foreground(output: &str) -> Result<ForegroundSample> {
    let mut lines = output.lines();
    let screen_saver = lines
        .next()
        .ok_or_else(|| anyhow!("Empty answer from System Events"))?;
    if screen_saver.trim() == "true" {
        return Ok(ForegroundSample::idle());
    }
    let app_name = lines.next().unwrap_or_default().trim();
    let window_title = lines.collect::<Vec<_>>().join(" ");
    if app_name.is_empty() {
        // Nothing is frontmost while the display sleeps.
        return Ok(ForegroundSample::idle());
    }
    Ok(ForegroundSample {
        app_name: app_name.into(),
        window_title: window_title.trim().into(),
        idle: false,
    })
}

/// Asks System Events and browsers through `osascript`.
pub struct AppleScriptProbe;

impl ForegroundProbe for AppleScriptProbe {
    #[instrument(skip(self))]
    fn sample(&mut self) -> Result<ForegroundSample> {
        if screen_unavailable() {
            return Ok(ForegroundSample::idle());
        }
        parse_foreground(&run_apple_script(FOREGROUND_SCRIPT)?)
    }
}

impl BrowserProbe for AppleScriptProbe {
    #[instrument(skip(self))]
    fn active_tab_url(&mut self, app_name: &str) -> Result<Option<String>> {
        let Some(script) = tab_url_script(app_name) else {
            return Ok(None);
        };
        let url = run_apple_script(&script)?;
        Ok((!url.is_empty()).then_some(url))
    }
}
