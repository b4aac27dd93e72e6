use crate::domain::jobs::RawClip;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("intake queue full")]
    Backpressure,

    #[error("intake queue closed")]
    Closed,
}

#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a clip, waiting at most `timeout` for room
    async fn enqueue_job(&self, clip: RawClip, timeout: Duration) -> Result<(), QueueError>;

    /// Dequeue a clip, blocking until one is available.
    /// Returns `None` once the queue has been shut down.
    async fn dequeue_job(&self) -> Option<RawClip>;

    /// Clips waiting across all sources
    fn depth(&self) -> usize;

    /// Clips waiting for one source
    fn depth_for(&self, source: &str) -> usize;
}
