use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Metadata announced by the producer and carried along with the clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMetadata {
    pub source: String,
    pub clip_number: u64,
    /// Declared byte size
    pub size: u64,
    /// Declared duration in seconds
    pub duration: f64,
    pub submitted_at: DateTime<Utc>,
}

/// A fully reassembled upload waiting for analysis.
#[derive(Debug, Clone)]
pub struct RawClip {
    pub id: String,
    pub metadata: ClipMetadata,
    pub payload: Bytes,
}

impl RawClip {
    pub fn new(metadata: ClipMetadata, payload: Bytes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata,
            payload,
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn clip_number(&self) -> u64 {
        self.metadata.clip_number
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Failed,
}

/// A raw clip in flight through the worker pool.
///
/// Transitions are one-way: `Queued -> Processing -> {Done, Failed}`.
/// Terminal jobs are never restarted.
#[derive(Debug)]
pub struct ProcessingJob {
    pub clip: RawClip,
    state: JobState,
    started_at: Option<Instant>,
}

impl ProcessingJob {
    pub fn new(clip: RawClip) -> Self {
        Self {
            clip,
            state: JobState::Queued,
            started_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Returns false if the job already left the queued state.
    pub fn start(&mut self) -> bool {
        if self.state != JobState::Queued {
            return false;
        }
        self.state = JobState::Processing;
        self.started_at = Some(Instant::now());
        true
    }

    /// Moves a processing job into its terminal state and returns the time spent processing.
    pub fn finish(&mut self, succeeded: bool) -> Duration {
        if self.state != JobState::Processing {
            return Duration::ZERO;
        }
        self.state = if succeeded {
            JobState::Done
        } else {
            JobState::Failed
        };
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

/// Confidence-bearing result returned by the analysis collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub highest_confidence: f32,
}

impl ResultSummary {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let highest_confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f32, f32::max);
        Self {
            detections,
            highest_confidence,
        }
    }
}

/// Analysis output held in a source's output buffer.
#[derive(Debug, Clone)]
pub struct ProcessedClip {
    pub source: String,
    pub clip_number: u64,
    pub payload: Bytes,
    /// False when the analyzer handed back the original bytes untouched
    pub annotated: bool,
    pub duration: f64,
    pub size: u64,
    pub processing_time: Duration,
    pub completed_at: DateTime<Utc>,
    pub summary: ResultSummary,
}
