//! Fixed-size pool of analysis workers draining the intake queue.
//!
//! Workers run independently, so clips of one source can finish out of
//! order. The output buffer's sorted insert restores the viewing order.

use crate::application::alerts::AlertGate;
use crate::application::registry::SourceRegistry;
use crate::domain::jobs::{JobState, ProcessedClip, ProcessingJob, RawClip};
use crate::ports::analyzer::{AnalysisError, Analyzer};
use crate::ports::queue::JobQueuePort;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default number of concurrent analysis workers
pub const WORKERS_COUNT: usize = 3;

/// Workers currently inside an analysis call.
#[derive(Debug, Default)]
pub struct WorkerActivity {
    active: AtomicUsize,
}

impl WorkerActivity {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard(self)
    }
}

struct ActiveGuard<'a>(&'a WorkerActivity);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerService<A, Q> {
    analyzer: A,
    queue: Q,
    registry: Arc<SourceRegistry>,
    alerts: Option<Arc<AlertGate>>,
    activity: Arc<WorkerActivity>,
}

impl<A, Q> WorkerService<A, Q>
where
    A: Analyzer + 'static,
    Q: JobQueuePort + 'static,
{
    pub fn new(
        analyzer: A,
        queue: Q,
        registry: Arc<SourceRegistry>,
        alerts: Option<Arc<AlertGate>>,
    ) -> Self {
        Self {
            analyzer,
            queue,
            registry,
            alerts,
            activity: Arc::new(WorkerActivity::default()),
        }
    }

    pub fn activity(&self) -> Arc<WorkerActivity> {
        self.activity.clone()
    }

    /// Pops clips until the queue shuts down. Panics while handling a clip are contained.
    pub async fn run_worker_loop(&self, worker_id: usize) {
        tracing::debug!(worker = worker_id, "Worker started");

        while let Some(clip) = self.queue.dequeue_job().await {
            let source = clip.source().to_string();
            let clip_number = clip.clip_number();

            if AssertUnwindSafe(self.process_job(clip, worker_id))
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!(worker = worker_id, source = %source, clip = clip_number, "Worker recovered from panic");
            }
        }

        tracing::debug!(worker = worker_id, "Worker stopped");
    }

    /// Runs one clip through the analyzer and buffers the result. Failed jobs are not retried.
    pub async fn process_job(&self, clip: RawClip, worker_id: usize) -> JobState {
        let Some(source) = self.registry.get(clip.source()) else {
            tracing::warn!(worker = worker_id, source = %clip.source(), "Dropping clip for unregistered source");
            return JobState::Failed;
        };

        let mut job = ProcessingJob::new(clip);
        job.start();
        tracing::debug!(
            worker = worker_id,
            source = %source.token(),
            clip = job.clip.clip_number(),
            job = %job.clip.id,
            "Processing clip"
        );

        let result = {
            let _active = self.activity.enter();
            let payload = job.clip.payload.clone();
            let metadata = &job.clip.metadata;
            AssertUnwindSafe(async { self.analyzer.analyze(payload, metadata).await })
                .catch_unwind()
                .await
                .unwrap_or(Err(AnalysisError::Panicked))
        };

        match result {
            Ok(analysis) => {
                let processing_time = job.finish(true);
                let processed = ProcessedClip {
                    source: job.clip.metadata.source.clone(),
                    clip_number: job.clip.clip_number(),
                    size: analysis.payload.len() as u64,
                    payload: analysis.payload,
                    annotated: analysis.annotated,
                    duration: job.clip.metadata.duration,
                    processing_time,
                    completed_at: Utc::now(),
                    summary: analysis.summary,
                };

                source.counters.record_processed(processing_time);
                if let Some(alerts) = &self.alerts {
                    if alerts.consider(&processed) {
                        source.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
                    }
                }

                let outcome = source.insert_processed(processed);
                tracing::info!(
                    worker = worker_id,
                    source = %source.token(),
                    clip = job.clip.clip_number(),
                    job = %job.clip.id,
                    elapsed_ms = processing_time.as_millis() as u64,
                    ?outcome,
                    "Clip processed"
                );
            }
            Err(e) => {
                job.finish(false);
                source.counters.clips_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    worker = worker_id,
                    source = %source.token(),
                    clip = job.clip.clip_number(),
                    job = %job.clip.id,
                    error = %e,
                    "Analysis failed, clip dropped"
                );
            }
        }

        job.state()
    }
}

/// Worker pool for draining the intake queue
pub struct WorkerPool<A, Q> {
    service: Arc<WorkerService<A, Q>>,
    count: usize,
}

impl<A, Q> WorkerPool<A, Q>
where
    A: Analyzer + 'static,
    Q: JobQueuePort + 'static,
{
    pub fn new(service: Arc<WorkerService<A, Q>>, count: usize) -> Self {
        Self {
            service,
            count: count.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Spawns `count` worker tasks. Each ends when the queue shuts down.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        (0..self.count)
            .map(|id| {
                let service = self.service.clone();
                tokio::spawn(async move {
                    service.run_worker_loop(id).await;
                })
            })
            .collect()
    }
}
