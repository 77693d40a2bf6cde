use std::{path::Path, time::Duration};

use anyhow::Result;
use collection::{collector::DataCollectionModule, identity::IdentityResolver};
use processing::{ProcessingModule, segmenter::Segmenter};
use storage::{
    entities::Sample,
    interval_store::{IntervalStore, SqliteIntervalStore},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::Config,
    utils::clock::{Clock, DefaultClock},
    window_api::{ForegroundProbe, GenericBrowserProbe, GenericForegroundProbe},
};

pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

/// Represents the starting point for the monitor. Runs until the process receives a shutdown
/// signal.
pub async fn start_monitor(app_dir: &Path, config: &Config) -> Result<()> {
    config.validate()?;
    let database_path = config.database_path(app_dir);
    info!("Recording activity into {database_path:?}");
    let store =
        SqliteIntervalStore::open(&database_path)?.with_recovery_window(config.recovery_window()?);
    let probe = GenericForegroundProbe::new(config)?;
    let identity = IdentityResolver::new(
        config.browsers.iter().cloned(),
        Box::new(GenericBrowserProbe::new()),
    );

    let shutdown_token = CancellationToken::new();

    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_monitor(
            store,
            probe,
            identity,
            config.sample_interval(),
            DefaultClock,
            shutdown_token,
        ),
    );
    result
}

/// Reconciles whatever a previous run left open, then samples until `shutdown_token` is
/// cancelled. The token is cancelled on return either way.
pub async fn run_monitor<S: IntervalStore>(
    store: S,
    probe: impl ForegroundProbe + 'static,
    identity: IdentityResolver,
    interval: Duration,
    clock: impl Clock + Clone,
    shutdown_token: CancellationToken,
) -> Result<()> {
    // A failure here is not a reason to stop tracking. The open interval is closed by the first
    // transition instead.
    if let Err(e) = store.reconcile_on_startup(clock.time()).await {
        error!("Error cleaning up unfinished activities {e:?}");
    }

    let (sender, receiver) = mpsc::channel::<Sample>(10);
    let collector = create_collector(
        sender,
        probe,
        identity,
        &shutdown_token,
        interval,
        clock.clone(),
    );
    let processor = create_processor(store, receiver, clock);

    let (collection_result, processing_result) = tokio::join!(collector.run(), processor.run());
    shutdown_token.cancel();

    if let Err(collection_result) = &collection_result {
        error!("Collection module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = &processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    collection_result.and(processing_result)
}

fn create_collector(
    sender: mpsc::Sender<Sample>,
    probe: impl ForegroundProbe + 'static,
    identity: IdentityResolver,
    shutdown_token: &CancellationToken,
    interval: Duration,
    clock: impl Clock,
) -> DataCollectionModule {
    DataCollectionModule::new(
        sender,
        Box::new(probe),
        identity,
        shutdown_token.clone(),
        interval,
        Box::new(clock),
    )
}

fn create_processor<S: IntervalStore>(
    store: S,
    receiver: mpsc::Receiver<Sample>,
    clock: impl Clock,
) -> ProcessingModule<Segmenter<S>> {
    ProcessingModule::new(receiver, Segmenter::new(store, Box::new(clock)))
}

#[cfg(test)]
mod monitor_tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::identity::IdentityResolver,
            run_monitor,
            storage::interval_store::{IntervalStore, SqliteIntervalStore},
        },
        utils::{clock::test_clock::TestClock, logging::TEST_LOGGING},
        window_api::{ForegroundSample, MockBrowserProbe, MockForegroundProbe},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn test_items() -> Vec<ForegroundSample> {
        let active = |name: &str| ForegroundSample {
            app_name: name.into(),
            window_title: "window".into(),
            idle: false,
        };
        vec![
            active("editor"),
            active("editor"),
            active("terminal"),
            ForegroundSample::idle(),
            active("editor"),
            active("editor"),
        ]
    }

    fn resolver() -> IdentityResolver {
        let mut browser = MockBrowserProbe::new();
        browser.expect_active_tab_url().never();
        IdentityResolver::new(["Safari".into()], Box::new(browser))
    }

    /// Runs the whole loop for a few simulated seconds and checks what ended up in the store.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_monitor() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockForegroundProbe::new();
        let mut items = test_items().into_iter();
        probe
            .expect_sample()
            .times(6)
            .returning(move || Ok(items.next().unwrap()));

        let store = SqliteIntervalStore::open_in_memory()?;
        let shutdown_token = CancellationToken::new();

        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(5500)).await;
                shutdown_token.cancel()
            },
            run_monitor(
                store.clone(),
                probe,
                resolver(),
                Duration::from_secs(1),
                TestClock::new(start()),
                shutdown_token.clone(),
            ),
        );
        result?;

        let stored = store
            .intervals_overlapping(start(), start() + chrono::Duration::hours(1))
            .await?;
        let names = stored.iter().map(|v| &*v.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["editor", "terminal", "editor"]);
        assert_eq!(stored[0].end, Some(start() + chrono::Duration::seconds(2)));
        assert_eq!(stored[1].end, Some(start() + chrono::Duration::seconds(3)));
        assert_eq!(stored[2].start, start() + chrono::Duration::seconds(4));
        // The clean shutdown closed the last activity.
        assert!(stored.iter().all(|v| !v.is_open()));
        assert!(stored[2].end >= Some(start() + chrono::Duration::seconds(5)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn startup_closes_crashed_interval() -> Result<()> {
        *TEST_LOGGING;
        let store = SqliteIntervalStore::open_in_memory()?;
        let crashed_at = start() - chrono::Duration::hours(2);
        store
            .insert_open_interval(crashed_at, "editor".into())
            .await?;

        let mut probe = MockForegroundProbe::new();
        probe
            .expect_sample()
            .returning(|| Ok(ForegroundSample::idle()));

        let shutdown_token = CancellationToken::new();
        shutdown_token.cancel();
        run_monitor(
            store.clone(),
            probe,
            resolver(),
            Duration::from_secs(1),
            TestClock::new(start()),
            shutdown_token,
        )
        .await?;

        let stored = store
            .intervals_overlapping(crashed_at, start())
            .await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].end, Some(crashed_at + chrono::Duration::minutes(5)));
        Ok(())
    }
}
