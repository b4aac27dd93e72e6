//! One producer connection's view of the ingest pipeline.
//!
//! The transport hands frames in; the session reassembles clips, pushes
//! finished ones into the intake queue, and reports what the producer should
//! be told back. Every drop ends up in the source's counters.

use crate::application::registry::SourceState;
use crate::domain::jobs::RawClip;
use crate::domain::messages::{ControlMessage, ServerMessage};
use crate::domain::reassembly::{ChunkReassembler, ReassemblerLimits, ReassemblyError};
use crate::ports::queue::{JobQueuePort, QueueError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct IngestSession {
    source: Arc<SourceState>,
    epoch: u64,
    reassembler: ChunkReassembler,
    queue: Arc<dyn JobQueuePort>,
    enqueue_timeout: Duration,
}

impl IngestSession {
    pub fn new(
        source: Arc<SourceState>,
        epoch: u64,
        limits: ReassemblerLimits,
        queue: Arc<dyn JobQueuePort>,
        enqueue_timeout: Duration,
    ) -> Self {
        let reassembler =
            ChunkReassembler::new(source.token(), limits).resume_after(source.last_clip_number());
        Self {
            source,
            epoch,
            reassembler,
            queue,
            enqueue_timeout,
        }
    }

    pub fn open_assemblies(&self) -> usize {
        self.reassembler.open_count()
    }

    /// Handles a text frame. Returns the acknowledgement to send, if any.
    pub async fn on_text(&mut self, text: &str) -> Option<ServerMessage> {
        let msg = match ControlMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.record_failure(&ReassemblyError::Malformed(e.to_string()));
                return None;
            }
        };

        let clip_number = msg.clip_number();
        let completing = matches!(msg, ControlMessage::ClipComplete { .. });
        let beginning = matches!(msg, ControlMessage::ClipBegin { .. });
        let mut result = self.reassembler.on_control(msg, Instant::now());
        self.drain_abandoned();

        // Numbering is per source, so a clip begun here must also beat any
        // newer connection's clips.
        if beginning && result.is_ok() && !self.source.claim_clip_number(clip_number) {
            self.reassembler.abandon(clip_number);
            result = Err(ReassemblyError::NonMonotonic {
                last: self.source.last_clip_number().unwrap_or_default(),
                got: clip_number,
            });
        }

        match result {
            Ok(Some(clip)) => Some(self.submit(clip).await),
            Ok(None) if completing => Some(ServerMessage::ClipAck {
                clip_number,
                accepted: false,
                reason: Some(String::from("clip was discarded")),
            }),
            Ok(None) => None,
            Err(e) => {
                self.record_failure(&e);
                completing.then(|| ServerMessage::ClipAck {
                    clip_number,
                    accepted: false,
                    reason: Some(e.to_string()),
                })
            }
        }
    }

    pub fn on_binary(&mut self, bytes: &[u8]) {
        let result = self.reassembler.on_binary(bytes, Instant::now());
        self.drain_abandoned();
        if let Err(e) = result {
            self.record_failure(&e);
        }
    }

    /// Expires stale assemblies. Called periodically by the transport.
    pub fn sweep(&mut self) {
        self.reassembler.expire(Instant::now());
        self.drain_abandoned();
    }

    async fn submit(&self, clip: RawClip) -> ServerMessage {
        let clip_number = clip.clip_number();
        let size = clip.payload.len();
        let id = clip.id.clone();

        match self.queue.enqueue_job(clip, self.enqueue_timeout).await {
            Ok(()) => {
                tracing::info!(source = %self.source.token(), epoch = self.epoch, clip = clip_number, job = %id, size, "Clip queued");
                ServerMessage::ClipAck {
                    clip_number,
                    accepted: true,
                    reason: None,
                }
            }
            Err(e) => {
                if e == QueueError::Backpressure {
                    self.source
                        .counters
                        .backpressure_drops
                        .fetch_add(1, Ordering::Relaxed);
                }
                tracing::warn!(source = %self.source.token(), epoch = self.epoch, clip = clip_number, error = %e, "Clip dropped at intake");
                ServerMessage::ClipAck {
                    clip_number,
                    accepted: false,
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    fn drain_abandoned(&mut self) {
        for e in self.reassembler.take_abandoned() {
            self.record_failure(&e);
        }
    }

    fn record_failure(&self, e: &ReassemblyError) {
        self.source
            .counters
            .reassembly_failures
            .fetch_add(1, Ordering::Relaxed);
        tracing::warn!(source = %self.source.token(), epoch = self.epoch, error = %e, "Reassembly failed");
    }
}
