use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    daemon::storage::{StoreError, entities::Sample, interval_store::IntervalStore},
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// What a sample does to the open interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Same activity as before, or still idle.
    Continue,
    /// The machine went idle. The open interval is closed and nothing replaces it.
    Close,
    /// Something is in focus again after idling or startup.
    Open(Arc<str>),
    /// Focus moved to another activity.
    Switch(Arc<str>),
}

/// Decides what `sample` means given the activity that is currently open.
pub fn next_transition(current: Option<&str>, sample: &Sample) -> Transition {
    if sample.idle || sample.identity.is_empty() {
        return match current {
            Some(_) => Transition::Close,
            None => Transition::Continue,
        };
    }
    match current {
        Some(current) if current == &*sample.identity => Transition::Continue,
        Some(_) => Transition::Switch(sample.identity.clone()),
        None => Transition::Open(sample.identity.clone()),
    }
}

/// Turns the sample stream into stored intervals.
///
/// The segmenter remembers which activity it left open. That memory only changes after the
/// matching store write succeeded, so a failed write is simply retried by the next sample that
/// disagrees with it.
pub struct Segmenter<S: IntervalStore> {
    store: S,
    current: Option<Arc<str>>,
    clock: Box<dyn Clock>,
}

impl<S: IntervalStore> Segmenter<S> {
    pub fn new(store: S, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            current: None,
            clock,
        }
    }

    /// Activity of the interval this segmenter has open.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub async fn apply(&mut self, sample: &Sample) -> Result<Transition, StoreError> {
        let transition = next_transition(self.current(), sample);
        match &transition {
            Transition::Continue => {}
            Transition::Close => self.close(sample.timestamp).await?,
            Transition::Open(name) => self.open(sample.timestamp, name.clone()).await?,
            Transition::Switch(name) => {
                self.close(sample.timestamp).await?;
                self.open(sample.timestamp, name.clone()).await?;
            }
        }
        Ok(transition)
    }

    async fn close(&mut self, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(closed) = self.store.close_open_interval(at).await? {
            info!(
                "Ended activity {} after {}s",
                closed.name,
                (closed.end_or(at) - closed.start).num_seconds()
            );
        }
        self.current = None;
        Ok(())
    }

    async fn open(&mut self, at: DateTime<Utc>, name: Arc<str>) -> Result<(), StoreError> {
        let id = match self.store.insert_open_interval(at, name.clone()).await {
            Err(StoreError::IntervalAlreadyOpen { id, name: stale }) => {
                warn!("Interval {id} ({stale}) was unexpectedly open, closing it");
                self.store.close_open_interval(at).await?;
                self.store.insert_open_interval(at, name.clone()).await?
            }
            result => result?,
        };
        info!("Started activity {name} ({id})");
        self.current = Some(name);
        Ok(())
    }
}

impl<S: IntervalStore> EventProcessor for Segmenter<S> {
    async fn process_next(&mut self, message: Sample) -> Result<()> {
        self.apply(&message).await?;
        Ok(())
    }

    /// Leaves nothing open behind on a clean shutdown.
    async fn finalize(&mut self) -> Result<()> {
        let now = self.clock.time();
        self.close(now).await?;
        Ok(())
    }
}
