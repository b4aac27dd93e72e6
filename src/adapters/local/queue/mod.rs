//! In-process intake queue shared by every producer connection.
//!
//! A bounded tokio channel gives backpressure to the ingest sessions. Workers
//! share the single receiver behind an async mutex, which makes the channel
//! multi-consumer.

use crate::domain::jobs::RawClip;
use crate::ports::queue::{JobQueuePort, QueueError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Depths {
    total: AtomicUsize,
    per_source: Mutex<HashMap<String, usize>>,
}

impl Depths {
    fn increment(&self, source: &str) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut per_source) = self.per_source.lock() {
            *per_source.entry(source.to_string()).or_insert(0) += 1;
        }
    }

    fn decrement(&self, source: &str) {
        let _ = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(mut per_source) = self.per_source.lock() {
            if let Some(count) = per_source.get_mut(source) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    per_source.remove(source);
                }
            }
        }
    }

    fn for_source(&self, source: &str) -> usize {
        self.per_source
            .lock()
            .map(|per_source| per_source.get(source).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct MemoryQueue {
    sender: mpsc::Sender<RawClip>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<RawClip>>>,
    depths: Arc<Depths>,
    shutdown: CancellationToken,
}

impl MemoryQueue {
    pub fn new(capacity: usize, shutdown: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            depths: Arc::new(Depths::default()),
            shutdown,
        }
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

#[async_trait]
impl JobQueuePort for MemoryQueue {
    async fn enqueue_job(&self, clip: RawClip, timeout: Duration) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        // Only a clip holding a slot counts toward the depth; a producer
        // still waiting for room does not.
        let permit = tokio::time::timeout(timeout, self.sender.reserve())
            .await
            .map_err(|_| QueueError::Backpressure)?
            .map_err(|_| QueueError::Closed)?;

        self.depths.increment(clip.source());
        permit.send(clip);
        Ok(())
    }

    async fn dequeue_job(&self) -> Option<RawClip> {
        let clip = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            clip = async { self.receiver.lock().await.recv().await } => clip,
        }?;
        self.depths.decrement(clip.source());
        Some(clip)
    }

    fn depth(&self) -> usize {
        self.depths.total.load(Ordering::SeqCst)
    }

    fn depth_for(&self, source: &str) -> usize {
        self.depths.for_source(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::ClipMetadata;
    use bytes::Bytes;
    use chrono::Utc;

    fn clip(source: &str, clip_number: u64) -> RawClip {
        RawClip::new(
            ClipMetadata {
                source: source.to_string(),
                clip_number,
                size: 1,
                duration: 1.0,
                submitted_at: Utc::now(),
            },
            Bytes::from_static(b"x"),
        )
    }

    #[tokio::test]
    async fn test_fifo_across_sources() {
        let queue = MemoryQueue::new(4, CancellationToken::new());
        let timeout = Duration::from_millis(50);
        queue.enqueue_job(clip("a", 1), timeout).await.unwrap();
        queue.enqueue_job(clip("b", 1), timeout).await.unwrap();
        queue.enqueue_job(clip("a", 2), timeout).await.unwrap();

        assert_eq!(queue.depth(), 3);
        assert_eq!(queue.depth_for("a"), 2);
        assert_eq!(queue.depth_for("b"), 1);

        let first = queue.dequeue_job().await.unwrap();
        assert_eq!((first.source(), first.clip_number()), ("a", 1));
        let second = queue.dequeue_job().await.unwrap();
        assert_eq!(second.source(), "b");
        assert_eq!(queue.depth_for("b"), 0);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_times_out() {
        let queue = MemoryQueue::new(1, CancellationToken::new());
        let timeout = Duration::from_millis(20);
        queue.enqueue_job(clip("a", 1), timeout).await.unwrap();

        let err = queue.enqueue_job(clip("a", 2), timeout).await.unwrap_err();
        assert_eq!(err, QueueError::Backpressure);
        assert_eq!(queue.depth_for("a"), 1);
    }

    #[tokio::test]
    async fn test_blocked_producer_resumes_when_worker_pops() {
        let queue = MemoryQueue::new(1, CancellationToken::new());
        queue
            .enqueue_job(clip("a", 1), Duration::from_millis(10))
            .await
            .unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .enqueue_job(clip("a", 2), Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.depth_for("a"), 1);

        assert_eq!(queue.dequeue_job().await.unwrap().clip_number(), 1);
        producer.await.unwrap().unwrap();
        assert_eq!(queue.depth_for("a"), 1);
        assert_eq!(queue.dequeue_job().await.unwrap().clip_number(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiting_workers() {
        let shutdown = CancellationToken::new();
        let queue = MemoryQueue::new(2, shutdown.clone());

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_job().await })
        };

        shutdown.cancel();
        assert!(worker.await.unwrap().is_none());
        assert_eq!(
            queue
                .enqueue_job(clip("a", 1), Duration::from_millis(10))
                .await
                .unwrap_err(),
            QueueError::Closed
        );
    }
}
