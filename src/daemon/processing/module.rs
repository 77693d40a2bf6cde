use anyhow::Result;

use crate::daemon::storage::entities::Sample;

/// Represents a consumer of samples. The monitor only has one, the [Segmenter](super::segmenter::Segmenter),
/// which turns them into stored intervals.
pub trait EventProcessor {
    fn process_next(&mut self, message: Sample) -> impl std::future::Future<Output = Result<()>>;

    /// Called once the sample stream has ended.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
