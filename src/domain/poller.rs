//! Viewer-side playback buffer and poll cadence.
//!
//! The server never paces viewers. Each viewer keeps a small local buffer and
//! shortens its poll interval when the buffer runs dry, lengthening it when the
//! buffer is full.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub initial_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub step: Duration,
    pub local_capacity: usize,
    pub buffer_threshold: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(5000),
            min_interval: Duration::from_millis(2000),
            max_interval: Duration::from_millis(8000),
            step: Duration::from_millis(1000),
            local_capacity: 3,
            buffer_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Buffering,
    Playing,
}

/// Clip block of the `next-video` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Response of the `next-video` delivery call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextVideo {
    pub video: VideoInfo,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalClip {
    pub clip_number: u64,
    pub duration: f64,
    pub payload: Bytes,
}

/// What the driver should do after playback of a clip ends.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStep {
    Play(LocalClip),
    /// Local buffer ran dry; poll now instead of waiting for the next tick
    PollNow,
}

#[derive(Debug)]
pub struct AdaptivePoller {
    config: PollerConfig,
    state: PlaybackState,
    interval: Duration,
    last_fetched: Option<u64>,
    local: VecDeque<LocalClip>,
    dropped: u64,
}

impl AdaptivePoller {
    pub fn new(config: PollerConfig) -> Self {
        let interval = config
            .initial_interval
            .clamp(config.min_interval, config.max_interval);
        Self {
            config,
            state: PlaybackState::Buffering,
            interval,
            last_fetched: None,
            local: VecDeque::with_capacity(config.local_capacity),
            dropped: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn buffered(&self) -> usize {
        self.local.len()
    }

    pub fn last_fetched(&self) -> Option<u64> {
        self.last_fetched
    }

    /// Clips pushed out of a full local buffer.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Clip number worth fetching for this poll result, if any.
    pub fn wants(&self, next: &NextVideo) -> Option<u64> {
        if !next.video.available {
            return None;
        }
        let clip_number = next.video.clip_number?;
        if Some(clip_number) == self.last_fetched {
            return None;
        }
        Some(clip_number)
    }

    /// Appends a fetched clip. Returns true if this moved the viewer into playing.
    pub fn accept(&mut self, clip: LocalClip) -> bool {
        self.last_fetched = Some(clip.clip_number);
        if self.local.len() >= self.config.local_capacity {
            self.local.pop_front();
            self.dropped += 1;
        }
        self.local.push_back(clip);

        if self.state == PlaybackState::Buffering && self.local.len() >= self.config.buffer_threshold
        {
            self.state = PlaybackState::Playing;
            return true;
        }
        false
    }

    /// The server no longer holds the clip; skip past it.
    pub fn skip(&mut self, clip_number: u64) {
        self.last_fetched = Some(clip_number);
    }

    /// Hands the next clip to the renderer. Nothing is handed out while buffering.
    pub fn next_for_playback(&mut self) -> Option<LocalClip> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.local.pop_front()
    }

    /// Called when the renderer finishes a clip.
    pub fn finish_playback(&mut self) -> PlaybackStep {
        if self.state == PlaybackState::Playing {
            if let Some(clip) = self.local.pop_front() {
                return PlaybackStep::Play(clip);
            }
        }
        self.state = PlaybackState::Buffering;
        PlaybackStep::PollNow
    }

    /// Adjusts the poll interval from the current local buffer fill. Call once per poll cycle.
    pub fn adapt_interval(&mut self) -> Duration {
        let len = self.local.len();
        if len < 1 {
            self.interval = self
                .interval
                .saturating_sub(self.config.step)
                .max(self.config.min_interval);
        } else if len >= self.config.local_capacity {
            self.interval = (self.interval + self.config.step).min(self.config.max_interval);
        }
        self.interval
    }
}

impl Default for AdaptivePoller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}
