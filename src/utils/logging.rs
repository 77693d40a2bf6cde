use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

pub const CLI_PREFIX: &str = "cli";
pub const MONITOR_PREFIX: &str = "monitor";

const LOG_TARGET: &str = "activitymon";
const KEPT_LOG_FILES: usize = 5;

/// Routes `tracing` output into daily rotated files under `<application dir>/logs`, and to
/// stdout when `show_std` is set. Without an explicit level `RUST_LOG` is honored, falling back
/// to `info`.
pub fn enable_logging(
    prefix: &str,
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(KEPT_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(application_data_path.join("logs"))?;

    let filter = match log_level {
        Some(level) => EnvFilter::new(format!("{LOG_TARGET}={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{LOG_TARGET}=info"))),
    };

    let file_layer = fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);
    let stdout_layer = show_std.then(|| fmt::layer().with_writer(std::io::stdout).with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init();
});
