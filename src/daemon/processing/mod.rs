use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{error, trace};

use super::storage::entities::Sample;

pub mod module;
pub mod segmenter;

/// Receives samples and hands them to a processor. Failures to process a single sample are logged
/// and the loop moves on, so one lost write never stops tracking.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<Sample>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<Sample>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(sample) = self.receiver.recv().await {
            trace!("Processing sample {:?}", sample);
            if let Err(e) = self.processor.process_next(sample.clone()).await {
                error!("Error processing sample {:?}: {e:?}", sample)
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
