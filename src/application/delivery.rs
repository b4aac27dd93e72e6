//! Read-only delivery operations over the per-source output buffers.
//!
//! Nothing here removes entries. The same clip can be offered and fetched by
//! any number of viewers until it ages out of the buffer.

use crate::application::registry::{SourceRegistry, SourceState};
use crate::application::worker::WorkerActivity;
use crate::domain::jobs::ProcessedClip;
use crate::domain::poller::{LocalClip, NextVideo, VideoInfo};
use crate::error::{Error, Result};
use crate::ports::delivery::ClipSource;
use crate::ports::queue::JobQueuePort;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Monitoring snapshot for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub queue_depth: usize,
    pub buffer_occupancy: usize,
    pub buffer_capacity: usize,
    pub clips_processed: u64,
    pub clips_failed: u64,
    pub avg_processing_time_seconds: f64,
    pub worker_count: usize,
    pub active_workers: usize,
    pub reassembly_failures: u64,
    pub backpressure_drops: u64,
    pub evictions: u64,
    pub alerts_raised: u64,
    pub source_connected: bool,
    pub epoch: u64,
}

#[derive(Clone)]
pub struct DeliveryService {
    registry: Arc<SourceRegistry>,
    queue: Arc<dyn JobQueuePort>,
    activity: Arc<WorkerActivity>,
    worker_count: usize,
}

impl DeliveryService {
    pub fn new(
        registry: Arc<SourceRegistry>,
        queue: Arc<dyn JobQueuePort>,
        activity: Arc<WorkerActivity>,
        worker_count: usize,
    ) -> Self {
        Self {
            registry,
            queue,
            activity,
            worker_count,
        }
    }

    fn source(&self, token: &str) -> Result<Arc<SourceState>> {
        self.registry
            .get(token)
            .ok_or_else(|| Error::NotFound(format!("source {}", token)))
    }

    /// Current selection for `token` plus its pending intake depth.
    pub fn peek_next(&self, token: &str) -> Result<NextVideo> {
        let source = self.source(token)?;
        let video = source
            .buffer()
            .select_for_delivery()
            .map(|clip| VideoInfo {
                available: true,
                clip_number: Some(clip.clip_number),
                size: Some(clip.size),
                duration: Some(clip.duration),
                timestamp: Some(clip.completed_at.to_rfc3339()),
            })
            .unwrap_or_default();

        Ok(NextVideo {
            video,
            queue_depth: self.queue.depth_for(token),
        })
    }

    /// `Ok(None)` when the clip was evicted or never made it into the buffer.
    pub fn fetch(&self, token: &str, clip_number: u64) -> Result<Option<ProcessedClip>> {
        let source = self.source(token)?;
        let clip = source.buffer().get(clip_number).cloned();
        if clip.is_none() {
            tracing::debug!(source = %token, clip = clip_number, "Clip not resident");
        }
        Ok(clip)
    }

    pub fn stats(&self, token: &str) -> Result<SourceStats> {
        let source = self.source(token)?;
        let (occupancy, capacity) = {
            let buffer = source.buffer();
            (buffer.len(), buffer.capacity())
        };
        let counters = &source.counters;

        Ok(SourceStats {
            queue_depth: self.queue.depth_for(token),
            buffer_occupancy: occupancy,
            buffer_capacity: capacity,
            clips_processed: counters.clips_processed.load(Ordering::Relaxed),
            clips_failed: counters.clips_failed.load(Ordering::Relaxed),
            avg_processing_time_seconds: counters.avg_processing_secs(),
            worker_count: self.worker_count,
            active_workers: self.activity.active(),
            reassembly_failures: counters.reassembly_failures.load(Ordering::Relaxed),
            backpressure_drops: counters.backpressure_drops.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            alerts_raised: counters.alerts_raised.load(Ordering::Relaxed),
            source_connected: source.is_live(),
            epoch: source.epoch(),
        })
    }
}

#[async_trait]
impl ClipSource for DeliveryService {
    async fn next_video(&self, token: &str) -> Result<NextVideo> {
        self.peek_next(token)
    }

    async fn fetch_clip(&self, token: &str, clip_number: u64) -> Result<Option<LocalClip>> {
        Ok(self.fetch(token, clip_number)?.map(|clip| LocalClip {
            clip_number: clip.clip_number,
            duration: clip.duration,
            payload: clip.payload,
        }))
    }
}
