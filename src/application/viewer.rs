//! Async driver that runs an [`AdaptivePoller`] against a clip source.

use crate::domain::poller::{AdaptivePoller, LocalClip, PlaybackStep, PollerConfig};
use crate::error::Result;
use crate::ports::delivery::ClipSource;
use std::future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

const MIN_PLAYBACK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A new clip was appended to the local buffer
    Fetched(u64),
    /// The offered clip was gone by the time it was fetched
    Skipped(u64),
    Unchanged,
}

pub struct ViewerSession<C> {
    source: C,
    token: String,
    poller: AdaptivePoller,
}

impl<C: ClipSource> ViewerSession<C> {
    pub fn new(source: C, token: impl Into<String>, config: PollerConfig) -> Self {
        Self {
            source,
            token: token.into(),
            poller: AdaptivePoller::new(config),
        }
    }

    pub fn poller(&self) -> &AdaptivePoller {
        &self.poller
    }

    pub fn poller_mut(&mut self) -> &mut AdaptivePoller {
        &mut self.poller
    }

    /// One poll cycle: peek, fetch if the offer is new, then adapt the interval.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let outcome = self.fetch_offered().await;
        let interval = self.poller.adapt_interval();
        tracing::debug!(
            source = %self.token,
            interval_ms = interval.as_millis() as u64,
            buffered = self.poller.buffered(),
            "Poll cycle finished"
        );
        outcome
    }

    async fn fetch_offered(&mut self) -> Result<PollOutcome> {
        let next = self.source.next_video(&self.token).await?;
        let Some(clip_number) = self.poller.wants(&next) else {
            return Ok(PollOutcome::Unchanged);
        };

        match self.source.fetch_clip(&self.token, clip_number).await? {
            Some(clip) => {
                if self.poller.accept(clip) {
                    tracing::info!(source = %self.token, clip = clip_number, "Playback started");
                }
                Ok(PollOutcome::Fetched(clip_number))
            }
            None => {
                tracing::debug!(source = %self.token, clip = clip_number, "Offered clip gone, skipping");
                self.poller.skip(clip_number);
                Ok(PollOutcome::Skipped(clip_number))
            }
        }
    }

    /// Polls and plays until `shutdown` is cancelled. `render` is called when a clip starts playing.
    pub async fn run<F>(&mut self, mut render: F, shutdown: CancellationToken)
    where
        F: FnMut(&LocalClip),
    {
        let mut next_poll = Instant::now();
        let mut playback_ends: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(next_poll) => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(source = %self.token, error = %e, "Poll failed");
                    }
                    next_poll = Instant::now() + self.poller.interval();

                    if playback_ends.is_none() {
                        if let Some(clip) = self.poller.next_for_playback() {
                            playback_ends = Some(start_playback(&clip, &mut render));
                        }
                    }
                }
                _ = wait_until(playback_ends) => {
                    match self.poller.finish_playback() {
                        PlaybackStep::Play(clip) => {
                            playback_ends = Some(start_playback(&clip, &mut render));
                        }
                        PlaybackStep::PollNow => {
                            tracing::debug!(source = %self.token, "Local buffer empty, rebuffering");
                            playback_ends = None;
                            next_poll = Instant::now();
                        }
                    }
                }
            }
        }
    }
}

fn start_playback<F: FnMut(&LocalClip)>(clip: &LocalClip, render: &mut F) -> Instant {
    render(clip);
    Instant::now() + playback_time(clip.duration)
}

fn playback_time(duration_secs: f64) -> Duration {
    Duration::try_from_secs_f64(duration_secs)
        .unwrap_or_default()
        .max(MIN_PLAYBACK)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
