use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, trace};

use crate::{
    daemon::storage::entities::Sample, utils::clock::Clock, window_api::ForegroundProbe,
};

use super::identity::IdentityResolver;

/// Samples the foreground on a fixed tick and forwards what it sees to the processing module.
pub struct DataCollectionModule {
    next: mpsc::Sender<Sample>,
    producer: Box<dyn ForegroundProbe>,
    identity: IdentityResolver,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<Sample>,
        producer: Box<dyn ForegroundProbe>,
        identity: IdentityResolver,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer,
            identity,
            collection_frequency,
            time_provider,
            shutdown,
        }
    }

    fn collect_data(&mut self) -> Result<Sample> {
        let timestamp = self.time_provider.time();
        let foreground = self.producer.sample()?;
        if foreground.idle || foreground.app_name.is_empty() {
            return Ok(Sample::idle(timestamp));
        }
        trace!("Foreground window {:?}", foreground.window_title);
        let identity = self.identity.resolve(&foreground.app_name);
        Ok(Sample::active(timestamp, identity))
    }

    /// Executes the collector event loop. Probe failures skip the tick, the next tick retries.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            match self.collect_data() {
                Ok(sample) => {
                    let span = info_span!("Processing collected sample");
                    debug!("Sending sample {:?}", sample);
                    self.next
                        .send(sample)
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Err(e) => {
                    error!("Failed to get window info, retrying next tick {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}
