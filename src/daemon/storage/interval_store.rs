use std::{
    future::Future,
    ops::Deref,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info, warn};

use super::{StoreError, entities::ActivityInterval};

/// How long an interval left open by a crashed monitor is assumed to have lasted.
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::minutes(5);

/// Interface for abstracting storage of activity intervals.
pub trait IntervalStore {
    /// Appends a new open interval. Fails if another interval is still open.
    fn insert_open_interval(
        &self,
        start: DateTime<Utc>,
        name: Arc<str>,
    ) -> impl Future<Output = Result<i64, StoreError>>;

    /// Closes whichever interval is open. The end is clamped so it never precedes the start.
    /// Returns the closed interval, or `None` if nothing was open.
    fn close_open_interval(
        &self,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>>;

    /// Closes an interval left open by a run that didn't shut down cleanly.
    fn reconcile_on_startup(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>>;

    fn open_interval(&self) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>>;

    /// Retrieves every interval overlapping `[from, to)`, the open one included, ordered by start.
    fn intervals_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityInterval>, StoreError>>;
}

impl<T: Deref> IntervalStore for T
where
    T::Target: IntervalStore,
{
    fn insert_open_interval(
        &self,
        start: DateTime<Utc>,
        name: Arc<str>,
    ) -> impl Future<Output = Result<i64, StoreError>> {
        self.deref().insert_open_interval(start, name)
    }

    fn close_open_interval(
        &self,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>> {
        self.deref().close_open_interval(end)
    }

    fn reconcile_on_startup(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>> {
        self.deref().reconcile_on_startup(now)
    }

    fn open_interval(&self) -> impl Future<Output = Result<Option<ActivityInterval>, StoreError>> {
        self.deref().open_interval()
    }

    fn intervals_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ActivityInterval>, StoreError>> {
        self.deref().intervals_overlapping(from, to)
    }
}

/// Row as it is laid out in the table. Timestamps are milliseconds since the epoch.
struct IntervalRow {
    id: i64,
    start_ms: i64,
    end_ms: Option<i64>,
    name: String,
}

impl IntervalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_ms: row.get(1)?,
            end_ms: row.get(2)?,
            name: row.get(3)?,
        })
    }

    fn into_entity(self) -> Result<ActivityInterval, StoreError> {
        let id = self.id;
        let to_date = |millis: i64| {
            DateTime::from_timestamp_millis(millis).ok_or(StoreError::InvalidTimestamp { id, millis })
        };
        Ok(ActivityInterval {
            id,
            start: to_date(self.start_ms)?,
            end: self.end_ms.map(to_date).transpose()?,
            name: self.name.into(),
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, start_ms, end_ms, name FROM activities";

fn find_open(tx: &Transaction<'_>) -> Result<Option<ActivityInterval>, StoreError> {
    tx.query_row(
        &format!("{SELECT_COLUMNS} WHERE end_ms IS NULL ORDER BY id LIMIT 1"),
        [],
        IntervalRow::from_row,
    )
    .optional()?
    .map(IntervalRow::into_entity)
    .transpose()
}

fn set_end(tx: &Transaction<'_>, id: i64, end: DateTime<Utc>) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE activities SET end_ms = MAX(start_ms, ?1) WHERE id = ?2 AND end_ms IS NULL",
        params![end.timestamp_millis(), id],
    )?;
    Ok(())
}

/// The main realization of [IntervalStore], backed by a SQLite file.
///
/// Writes are serialized through a mutex around the connection and executed on the blocking pool.
/// The database runs in WAL mode so a report can read while the monitor writes.
#[derive(Clone)]
pub struct SqliteIntervalStore {
    connection: Arc<Mutex<Connection>>,
    recovery_window: Duration,
}

impl SqliteIntervalStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!("Opening interval store at {path:?}");
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory database. The data is gone once the last handle is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn with_recovery_window(self, recovery_window: Duration) -> Self {
        Self {
            recovery_window,
            ..self
        }
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.busy_timeout(StdDuration::from_secs(5))?;
        // In-memory databases answer with "memory", which is fine.
        let mode: String =
            connection.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("Journal mode {mode}");
        connection.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER,
                name TEXT NOT NULL,
                CHECK (end_ms IS NULL OR end_ms >= start_ms)
            );

            CREATE INDEX IF NOT EXISTS idx_activities_start ON activities(start_ms);
            CREATE INDEX IF NOT EXISTS idx_activities_open ON activities(end_ms) WHERE end_ms IS NULL;
            ",
        )?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            recovery_window: DEFAULT_RECOVERY_WINDOW,
        })
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock().map_err(|_| StoreError::Poisoned)?;
            operation(&mut *guard)
        })
        .await?
    }
}

/// Picks the end of an interval that was left open by an unclean shutdown. The monitor is assumed
/// to have died at most `recovery_window` after the interval started, and never after `now`.
pub fn recovered_end(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    recovery_window: Duration,
) -> DateTime<Utc> {
    start
        .checked_add_signed(recovery_window)
        .map_or(now, |limit| limit.min(now))
        .max(start)
}

impl IntervalStore for SqliteIntervalStore {
    async fn insert_open_interval(
        &self,
        start: DateTime<Utc>,
        name: Arc<str>,
    ) -> Result<i64, StoreError> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            if let Some(open) = find_open(&tx)? {
                return Err(StoreError::IntervalAlreadyOpen {
                    id: open.id,
                    name: open.name.to_string(),
                });
            }
            tx.execute(
                "INSERT INTO activities (start_ms, name) VALUES (?1, ?2)",
                params![start.timestamp_millis(), &*name],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn close_open_interval(
        &self,
        end: DateTime<Utc>,
    ) -> Result<Option<ActivityInterval>, StoreError> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let Some(open) = find_open(&tx)? else {
                return Ok(None);
            };
            set_end(&tx, open.id, end)?;
            tx.commit()?;
            Ok(Some(ActivityInterval {
                end: Some(end.max(open.start)),
                ..open
            }))
        })
        .await
    }

    async fn reconcile_on_startup(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ActivityInterval>, StoreError> {
        let recovery_window = self.recovery_window;
        let recovered = self
            .with_connection(move |connection| {
                let tx = connection.transaction()?;
                let Some(open) = find_open(&tx)? else {
                    return Ok(None);
                };
                let end = recovered_end(open.start, now, recovery_window);
                set_end(&tx, open.id, end)?;
                // Older runs might have left more than one open row behind.
                let leftovers = tx.execute(
                    "UPDATE activities SET end_ms = start_ms WHERE end_ms IS NULL",
                    [],
                )?;
                if leftovers > 0 {
                    warn!("Closed {leftovers} additional dangling intervals");
                }
                tx.commit()?;
                Ok(Some(ActivityInterval {
                    end: Some(end),
                    ..open
                }))
            })
            .await?;
        if let Some(interval) = &recovered {
            info!(
                "Recovered interval {} ({}) left open since {}",
                interval.id, interval.name, interval.start
            );
        }
        Ok(recovered)
    }

    async fn open_interval(&self) -> Result<Option<ActivityInterval>, StoreError> {
        self.with_connection(|connection| {
            let tx = connection.transaction()?;
            find_open(&tx)
        })
        .await
    }

    async fn intervals_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActivityInterval>, StoreError> {
        self.with_connection(move |connection| {
            let mut statement = connection.prepare(&format!(
                "{SELECT_COLUMNS} WHERE start_ms < ?2 AND (end_ms IS NULL OR end_ms > ?1) ORDER BY start_ms, id"
            ))?;
            let rows = statement
                .query_map(
                    params![from.timestamp_millis(), to.timestamp_millis()],
                    IntervalRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(IntervalRow::into_entity).collect()
        })
        .await
    }
}
