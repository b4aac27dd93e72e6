//! Registry of producer sources and their per-source state.
//!
//! Each source owns its output buffer behind its own lock, so workers and
//! delivery handlers of different sources never contend.

use crate::domain::jobs::ProcessedClip;
use crate::domain::output_buffer::{InsertOutcome, OutputBuffer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown source")]
    UnknownSource,
}

/// Drop and throughput counters for one source.
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub clips_processed: AtomicU64,
    pub clips_failed: AtomicU64,
    pub reassembly_failures: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub evictions: AtomicU64,
    pub alerts_raised: AtomicU64,
    pub processing_micros: AtomicU64,
}

impl SourceCounters {
    pub fn record_processed(&self, elapsed: Duration) {
        self.clips_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_processing_secs(&self) -> f64 {
        let processed = self.clips_processed.load(Ordering::Relaxed);
        if processed == 0 {
            return 0.0;
        }
        let micros = self.processing_micros.load(Ordering::Relaxed);
        micros as f64 / processed as f64 / 1_000_000.0
    }
}

#[derive(Debug)]
struct LiveConnection {
    epoch: u64,
    superseded: CancellationToken,
}

/// Handle given to an accepted producer connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub token: String,
    pub epoch: u64,
    /// Cancelled when a newer connection for the same source is accepted
    pub superseded: CancellationToken,
}

#[derive(Debug)]
pub struct SourceState {
    token: String,
    epoch: AtomicU64,
    /// Last begun clip number plus one; zero until the first clip
    last_clip: AtomicU64,
    live: Mutex<Option<LiveConnection>>,
    buffer: RwLock<OutputBuffer>,
    pub counters: SourceCounters,
}

impl SourceState {
    fn new(token: String, buffer_capacity: usize) -> Self {
        Self {
            token,
            epoch: AtomicU64::new(0),
            last_clip: AtomicU64::new(0),
            live: Mutex::new(None),
            buffer: RwLock::new(OutputBuffer::new(buffer_capacity)),
            counters: SourceCounters::default(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Highest clip number begun by any connection of this source.
    pub fn last_clip_number(&self) -> Option<u64> {
        self.last_clip.load(Ordering::SeqCst).checked_sub(1)
    }

    /// Records `clip_number` as begun. Fails unless it is above every clip
    /// number seen for the source, across reconnects.
    pub fn claim_clip_number(&self, clip_number: u64) -> bool {
        let next = clip_number.saturating_add(1);
        self.last_clip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (next > current).then_some(next)
            })
            .is_ok()
    }

    pub fn is_live(&self) -> bool {
        self.live.lock().map(|live| live.is_some()).unwrap_or(false)
    }

    /// Inserts under the buffer's write lock and counts evictions.
    pub fn insert_processed(&self, clip: ProcessedClip) -> InsertOutcome {
        let outcome = match self.buffer.write() {
            Ok(mut buffer) => buffer.insert(clip),
            Err(poisoned) => poisoned.into_inner().insert(clip),
        };
        if matches!(outcome, InsertOutcome::Evicted(_) | InsertOutcome::Rejected) {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    pub fn buffer(&self) -> RwLockReadGuard<'_, OutputBuffer> {
        match self.buffer.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn connect(&self) -> ConnectionHandle {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = CancellationToken::new();
        let mut live = match self.live.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = live.replace(LiveConnection {
            epoch,
            superseded: superseded.clone(),
        }) {
            tracing::info!(source = %self.token, old_epoch = previous.epoch, epoch, "Replacing producer connection");
            previous.superseded.cancel();
        }
        ConnectionHandle {
            token: self.token.clone(),
            epoch,
            superseded,
        }
    }

    fn disconnect(&self, epoch: u64) -> bool {
        let mut live = match self.live.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match live.as_ref() {
            Some(current) if current.epoch == epoch => {
                *live = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<SourceState>>>,
    open_registration: bool,
    buffer_capacity: usize,
}

impl SourceRegistry {
    /// With an empty token list any producer token is registered on first connect.
    pub fn new(tokens: &[String], buffer_capacity: usize) -> Self {
        let sources = tokens
            .iter()
            .map(|t| (t.clone(), Arc::new(SourceState::new(t.clone(), buffer_capacity))))
            .collect();
        Self {
            sources: RwLock::new(sources),
            open_registration: tokens.is_empty(),
            buffer_capacity,
        }
    }

    pub fn get(&self, token: &str) -> Option<Arc<SourceState>> {
        let sources = match self.sources.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sources.get(token).cloned()
    }

    /// Accepts a producer connection, superseding any previous one for the source.
    pub fn connect(&self, token: &str) -> Result<ConnectionHandle, RegistryError> {
        let state = match self.get(token) {
            Some(state) => state,
            None if self.open_registration => {
                let mut sources = match self.sources.write() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                sources
                    .entry(token.to_string())
                    .or_insert_with(|| {
                        tracing::info!(source = %token, "Registered new source");
                        Arc::new(SourceState::new(token.to_string(), self.buffer_capacity))
                    })
                    .clone()
            }
            None => return Err(RegistryError::UnknownSource),
        };
        Ok(state.connect())
    }

    /// Clears liveness if `epoch` is still the current connection. Queued jobs are left alone.
    pub fn disconnect(&self, token: &str, epoch: u64) -> bool {
        self.get(token)
            .map(|state| state.disconnect(epoch))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::ResultSummary;
    use bytes::Bytes;
    use chrono::Utc;

    fn processed(clip_number: u64) -> ProcessedClip {
        ProcessedClip {
            source: "cam".to_string(),
            clip_number,
            payload: Bytes::from_static(b"x"),
            annotated: true,
            duration: 1.0,
            size: 1,
            processing_time: Duration::from_millis(1),
            completed_at: Utc::now(),
            summary: ResultSummary::default(),
        }
    }

    #[test]
    fn test_allow_list_rejects_unknown() {
        let registry = SourceRegistry::new(&["cam".to_string()], 10);
        assert!(registry.connect("cam").is_ok());
        assert_eq!(
            registry.connect("intruder").unwrap_err(),
            RegistryError::UnknownSource
        );
    }

    #[test]
    fn test_open_registration() {
        let registry = SourceRegistry::new(&[], 10);
        assert!(registry.get("new-cam").is_none());
        registry.connect("new-cam").unwrap();
        assert!(registry.get("new-cam").unwrap().is_live());
    }

    #[test]
    fn test_new_connection_supersedes_old() {
        let registry = SourceRegistry::new(&[], 10);
        let first = registry.connect("cam").unwrap();
        let second = registry.connect("cam").unwrap();

        assert_eq!(first.epoch, 1);
        assert_eq!(second.epoch, 2);
        assert!(first.superseded.is_cancelled());
        assert!(!second.superseded.is_cancelled());

        // Stale disconnect must not clear the newer connection.
        assert!(!registry.disconnect("cam", first.epoch));
        assert!(registry.get("cam").unwrap().is_live());
        assert!(registry.disconnect("cam", second.epoch));
        assert!(!registry.get("cam").unwrap().is_live());
    }

    #[test]
    fn test_clip_numbers_increase_across_connections() {
        let registry = SourceRegistry::new(&[], 10);
        registry.connect("cam").unwrap();
        let state = registry.get("cam").unwrap();
        assert_eq!(state.last_clip_number(), None);
        assert!(state.claim_clip_number(0));
        assert!(state.claim_clip_number(7));

        registry.connect("cam").unwrap();
        assert_eq!(state.last_clip_number(), Some(7));
        assert!(!state.claim_clip_number(1));
        assert!(!state.claim_clip_number(7));
        assert!(state.claim_clip_number(8));
    }

    #[test]
    fn test_evictions_are_counted() {
        let registry = SourceRegistry::new(&["cam".to_string()], 2);
        let state = registry.get("cam").unwrap();
        for n in 1..=4 {
            state.insert_processed(processed(n));
        }
        assert_eq!(state.counters.evictions.load(Ordering::Relaxed), 2);
        assert_eq!(state.buffer().clip_numbers(), vec![3, 4]);
    }

    #[test]
    fn test_average_processing_time() {
        let counters = SourceCounters::default();
        assert_eq!(counters.avg_processing_secs(), 0.0);
        counters.record_processed(Duration::from_millis(1000));
        counters.record_processed(Duration::from_millis(3000));
        assert!((counters.avg_processing_secs() - 2.0).abs() < 1e-9);
    }
}
