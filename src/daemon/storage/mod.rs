//!  Storage is organized through [interval_store::SqliteIntervalStore].
//!  The basic idea is:
//!   - There is a single table of activity intervals.
//!   - An interval is appended when the foreground activity changes and is left open.
//!   - The only update an interval ever receives is the write that closes it.
//!   - At most one interval is open at a time.

pub mod entities;
pub mod interval_store;

use thiserror::Error;

/// Errors produced by the interval store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Opening a new interval while another one is still open.
    #[error("interval {id} ({name}) is still open")]
    IntervalAlreadyOpen { id: i64, name: String },
    /// A stored timestamp doesn't fit into a date.
    #[error("invalid timestamp {millis} in interval {id}")]
    InvalidTimestamp { id: i64, millis: i64 },
    /// Some earlier holder of the connection panicked.
    #[error("database connection lock is poisoned")]
    Poisoned,
    /// The blocking task running the query failed.
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
