//! Decides which processed clips raise an alert.
//!
//! An alert fires when a clip's highest confidence reaches the threshold and
//! the source has not alerted within the cooldown window.

use crate::domain::alerts::AlertEvent;
use crate::domain::jobs::ProcessedClip;
use crate::ports::alerts::AlertPublisher;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct AlertGate {
    publisher: Arc<dyn AlertPublisher>,
    threshold: f32,
    cooldown: Duration,
    last_raised: Mutex<HashMap<String, Instant>>,
}

impl AlertGate {
    pub fn new(publisher: Arc<dyn AlertPublisher>, threshold: f32, cooldown: Duration) -> Self {
        Self {
            publisher,
            threshold,
            cooldown,
            last_raised: Mutex::new(HashMap::new()),
        }
    }

    /// Publishes an alert for `clip` if it qualifies. Returns true when one was raised.
    pub fn consider(&self, clip: &ProcessedClip) -> bool {
        self.consider_at(clip, Instant::now())
    }

    fn consider_at(&self, clip: &ProcessedClip, now: Instant) -> bool {
        if clip.summary.highest_confidence < self.threshold {
            return false;
        }

        {
            let mut last_raised = match self.last_raised.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(previous) = last_raised.get(&clip.source) {
                if now.saturating_duration_since(*previous) < self.cooldown {
                    tracing::debug!(source = %clip.source, clip = clip.clip_number, "Alert suppressed by cooldown");
                    return false;
                }
            }
            last_raised.insert(clip.source.clone(), now);
        }

        let listeners = self.publisher.publish(AlertEvent {
            source_token: clip.source.clone(),
            clip_number: clip.clip_number,
            result_summary: clip.summary.clone(),
            raised_at: Utc::now(),
        });
        tracing::info!(source = %clip.source, clip = clip.clip_number, listeners, "Alert published");
        true
    }
}
