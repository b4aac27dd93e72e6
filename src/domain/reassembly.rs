//! Chunk reassembly for one producer connection.
//!
//! Every chunk header names the clip it belongs to, so several assemblies may
//! be open at once without chunks being attributed to the wrong clip. Chunks
//! of a clip must arrive in index order starting at zero.

use crate::domain::jobs::{ClipMetadata, RawClip};
use crate::domain::messages::ControlMessage;
use bytes::BytesMut;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

/// Failed clip numbers older than this distance behind the newest begun clip are forgotten.
const DISCARDED_WINDOW: u64 = 64;

/// Upper bound on what `clip-begin` reserves up front; the buffer grows with the chunks.
const INITIAL_RESERVE: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("clip {0} is already open")]
    DuplicateClip(u64),

    #[error("clip {got} does not follow clip {last}")]
    NonMonotonic { last: u64, got: u64 },

    #[error("clip {clip_number} declares {size} bytes, limit is {limit}")]
    TooLarge {
        clip_number: u64,
        size: u64,
        limit: u64,
    },

    #[error("clip {clip_number} rejected, {limit} assemblies already open")]
    TooManyOpen { clip_number: u64, limit: usize },

    #[error("no open assembly for clip {0}")]
    UnknownClip(u64),

    #[error("clip {clip_number}: expected chunk {expected}, got {got}")]
    ChunkOutOfOrder {
        clip_number: u64,
        expected: u32,
        got: u32,
    },

    #[error("clip {clip_number}: chunk {chunk_index} announced {expected} bytes, received {received}")]
    ChunkSizeMismatch {
        clip_number: u64,
        chunk_index: u32,
        expected: u64,
        received: u64,
    },

    #[error("clip {clip_number}: payload of chunk {chunk_index} never arrived")]
    MissingChunkBytes { clip_number: u64, chunk_index: u32 },

    #[error("clip {clip_number}: expected {expected} chunks, received {received}")]
    MissingChunks {
        clip_number: u64,
        expected: u32,
        received: u32,
    },

    #[error("clip {clip_number}: declared {declared} bytes, received {received}")]
    SizeMismatch {
        clip_number: u64,
        declared: u64,
        received: u64,
    },

    #[error("clip {0} timed out awaiting chunks")]
    TimedOut(u64),

    #[error("binary frame without a preceding chunk header")]
    UnexpectedBinary,

    #[error("malformed control message: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ReassemblerLimits {
    pub max_open: usize,
    pub max_clip_bytes: u64,
    pub timeout: Duration,
}

impl Default for ReassemblerLimits {
    fn default() -> Self {
        Self {
            max_open: 4,
            max_clip_bytes: 64 * 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Assembly {
    declared_size: u64,
    duration: f64,
    opened_at: Instant,
    chunks_received: u32,
    buf: BytesMut,
}

#[derive(Debug, Clone, Copy)]
struct PendingChunk {
    clip_number: u64,
    chunk_index: u32,
    chunk_size: u64,
    /// Payload belongs to a clip that already failed and is swallowed
    discard: bool,
}

#[derive(Debug)]
pub struct ChunkReassembler {
    source: String,
    limits: ReassemblerLimits,
    open: BTreeMap<u64, Assembly>,
    pending: Option<PendingChunk>,
    discarded: HashSet<u64>,
    last_begun: Option<u64>,
    abandoned: Vec<ReassemblyError>,
}

impl ChunkReassembler {
    pub fn new(source: impl Into<String>, limits: ReassemblerLimits) -> Self {
        Self {
            source: source.into(),
            limits,
            open: BTreeMap::new(),
            pending: None,
            discarded: HashSet::new(),
            last_begun: None,
            abandoned: Vec::new(),
        }
    }

    /// Continues a source's clip numbering from an earlier connection.
    pub fn resume_after(mut self, last_begun: Option<u64>) -> Self {
        self.last_begun = last_begun;
        self
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Drops an assembly rejected from outside. Its later frames are swallowed.
    pub fn abandon(&mut self, clip_number: u64) {
        self.discard(clip_number);
    }

    /// Applies one control message. Returns the finished clip on a successful `clip-complete`.
    pub fn on_control(
        &mut self,
        msg: ControlMessage,
        now: Instant,
    ) -> Result<Option<RawClip>, ReassemblyError> {
        self.interrupt_pending();
        self.expire(now);

        match msg {
            ControlMessage::ClipBegin {
                clip_number,
                size,
                duration,
            } => self.begin(clip_number, size, duration, now).map(|_| None),
            ControlMessage::ChunkHeader {
                clip_number,
                chunk_index,
                chunk_size,
            } => self
                .chunk_header(clip_number, chunk_index, chunk_size)
                .map(|_| None),
            ControlMessage::ClipComplete {
                clip_number,
                total_chunks,
            } => self.complete(clip_number, total_chunks),
        }
    }

    /// Applies the binary payload that follows a chunk header.
    pub fn on_binary(&mut self, bytes: &[u8], now: Instant) -> Result<(), ReassemblyError> {
        self.expire(now);

        let pending = self.pending.take().ok_or(ReassemblyError::UnexpectedBinary)?;
        if pending.discard {
            return Ok(());
        }

        let received = bytes.len() as u64;
        if received != pending.chunk_size {
            self.discard(pending.clip_number);
            return Err(ReassemblyError::ChunkSizeMismatch {
                clip_number: pending.clip_number,
                chunk_index: pending.chunk_index,
                expected: pending.chunk_size,
                received,
            });
        }

        // Expired in the meantime; the timeout was already recorded.
        if let Some(assembly) = self.open.get_mut(&pending.clip_number) {
            assembly.buf.extend_from_slice(bytes);
            assembly.chunks_received += 1;
        }
        Ok(())
    }

    /// Abandons assemblies that have been open longer than the configured timeout.
    pub fn expire(&mut self, now: Instant) {
        let timeout = self.limits.timeout;
        let expired: Vec<u64> = self
            .open
            .iter()
            .filter(|(_, a)| now.saturating_duration_since(a.opened_at) >= timeout)
            .map(|(n, _)| *n)
            .collect();

        for clip_number in expired {
            self.discard(clip_number);
            self.abandoned.push(ReassemblyError::TimedOut(clip_number));
        }
    }

    /// Failures recorded as a side effect of other frames (timeouts, interrupted chunks).
    pub fn take_abandoned(&mut self) -> Vec<ReassemblyError> {
        std::mem::take(&mut self.abandoned)
    }

    fn begin(
        &mut self,
        clip_number: u64,
        size: u64,
        duration: f64,
        now: Instant,
    ) -> Result<(), ReassemblyError> {
        if self.open.contains_key(&clip_number) {
            return Err(ReassemblyError::DuplicateClip(clip_number));
        }
        if let Some(last) = self.last_begun {
            if clip_number <= last {
                self.discarded.insert(clip_number);
                return Err(ReassemblyError::NonMonotonic {
                    last,
                    got: clip_number,
                });
            }
        }
        self.last_begun = Some(clip_number);
        self.prune_discarded(clip_number);

        if size > self.limits.max_clip_bytes {
            self.discarded.insert(clip_number);
            return Err(ReassemblyError::TooLarge {
                clip_number,
                size,
                limit: self.limits.max_clip_bytes,
            });
        }
        if self.open.len() >= self.limits.max_open {
            self.discarded.insert(clip_number);
            return Err(ReassemblyError::TooManyOpen {
                clip_number,
                limit: self.limits.max_open,
            });
        }

        self.open.insert(
            clip_number,
            Assembly {
                declared_size: size,
                duration,
                opened_at: now,
                chunks_received: 0,
                buf: BytesMut::with_capacity(size.min(INITIAL_RESERVE) as usize),
            },
        );
        Ok(())
    }

    fn chunk_header(
        &mut self,
        clip_number: u64,
        chunk_index: u32,
        chunk_size: u64,
    ) -> Result<(), ReassemblyError> {
        let mut pending = PendingChunk {
            clip_number,
            chunk_index,
            chunk_size,
            discard: true,
        };

        if self.discarded.contains(&clip_number) {
            self.pending = Some(pending);
            return Ok(());
        }

        let Some(assembly) = self.open.get(&clip_number) else {
            self.discarded.insert(clip_number);
            self.pending = Some(pending);
            return Err(ReassemblyError::UnknownClip(clip_number));
        };

        let expected = assembly.chunks_received;
        let received = assembly.buf.len() as u64 + chunk_size;
        let declared = assembly.declared_size;

        if chunk_index != expected {
            self.discard(clip_number);
            self.pending = Some(pending);
            return Err(ReassemblyError::ChunkOutOfOrder {
                clip_number,
                expected,
                got: chunk_index,
            });
        }
        if received > declared {
            self.discard(clip_number);
            self.pending = Some(pending);
            return Err(ReassemblyError::SizeMismatch {
                clip_number,
                declared,
                received,
            });
        }

        pending.discard = false;
        self.pending = Some(pending);
        Ok(())
    }

    fn complete(
        &mut self,
        clip_number: u64,
        total_chunks: u32,
    ) -> Result<Option<RawClip>, ReassemblyError> {
        if self.discarded.remove(&clip_number) {
            return Ok(None);
        }

        let assembly = self
            .open
            .remove(&clip_number)
            .ok_or(ReassemblyError::UnknownClip(clip_number))?;

        if assembly.chunks_received != total_chunks {
            return Err(ReassemblyError::MissingChunks {
                clip_number,
                expected: total_chunks,
                received: assembly.chunks_received,
            });
        }

        let received = assembly.buf.len() as u64;
        if received != assembly.declared_size {
            return Err(ReassemblyError::SizeMismatch {
                clip_number,
                declared: assembly.declared_size,
                received,
            });
        }

        let metadata = ClipMetadata {
            source: self.source.clone(),
            clip_number,
            size: received,
            duration: assembly.duration,
            submitted_at: Utc::now(),
        };
        Ok(Some(RawClip::new(metadata, assembly.buf.freeze())))
    }

    /// A control frame arrived while chunk bytes were still expected.
    fn interrupt_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.discard {
            return;
        }
        self.discard(pending.clip_number);
        self.abandoned.push(ReassemblyError::MissingChunkBytes {
            clip_number: pending.clip_number,
            chunk_index: pending.chunk_index,
        });
    }

    fn discard(&mut self, clip_number: u64) {
        self.open.remove(&clip_number);
        self.discarded.insert(clip_number);
    }

    fn prune_discarded(&mut self, newest: u64) {
        let floor = newest.saturating_sub(DISCARDED_WINDOW);
        self.discarded.retain(|n| *n >= floor);
    }
}
