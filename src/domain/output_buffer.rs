//! Bounded per-source window of processed clips.
//!
//! Workers finish clips out of order, so entries are kept sorted by clip
//! number rather than by arrival. When the window is full the smallest clip
//! number is evicted.

use crate::domain::jobs::ProcessedClip;
use std::collections::BTreeMap;

pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Same clip number was already buffered and has been overwritten
    Replaced,
    /// Inserted after evicting the given clip number
    Evicted(u64),
    /// Older than everything in a full window; dropped immediately
    Rejected,
}

#[derive(Debug)]
pub struct OutputBuffer {
    capacity: usize,
    entries: BTreeMap<u64, ProcessedClip>,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, clip: ProcessedClip) -> InsertOutcome {
        let clip_number = clip.clip_number;

        if self.entries.contains_key(&clip_number) {
            self.entries.insert(clip_number, clip);
            return InsertOutcome::Replaced;
        }

        if self.entries.len() < self.capacity {
            self.entries.insert(clip_number, clip);
            return InsertOutcome::Inserted;
        }

        match self.entries.first_key_value() {
            Some((&oldest, _)) if clip_number < oldest => InsertOutcome::Rejected,
            _ => {
                let evicted = self.entries.pop_first().map(|(n, _)| n);
                self.entries.insert(clip_number, clip);
                match evicted {
                    Some(n) => InsertOutcome::Evicted(n),
                    None => InsertOutcome::Inserted,
                }
            }
        }
    }

    pub fn get(&self, clip_number: u64) -> Option<&ProcessedClip> {
        self.entries.get(&clip_number)
    }

    pub fn newest_available(&self) -> Option<&ProcessedClip> {
        self.entries.values().next_back()
    }

    /// Clip offered to viewers: the second-newest entry, or the only one.
    ///
    /// Nothing is consumed; repeated calls return the same clip until the
    /// window moves.
    pub fn select_for_delivery(&self) -> Option<&ProcessedClip> {
        let mut newest_first = self.entries.values().rev();
        let newest = newest_first.next()?;
        Some(newest_first.next().unwrap_or(newest))
    }

    pub fn clip_numbers(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::ResultSummary;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Duration;

    fn processed(clip_number: u64) -> ProcessedClip {
        ProcessedClip {
            source: "cam".to_string(),
            clip_number,
            payload: Bytes::from(format!("clip-{}", clip_number)),
            annotated: true,
            duration: 10.0,
            size: 6,
            processing_time: Duration::from_millis(5),
            completed_at: Utc::now(),
            summary: ResultSummary::default(),
        }
    }

    #[test]
    fn test_sorted_insert_despite_completion_order() {
        let mut buffer = OutputBuffer::new(10);
        for n in [3, 1, 2] {
            buffer.insert(processed(n));
        }
        assert_eq!(buffer.newest_available().unwrap().clip_number, 3);
        assert_eq!(buffer.clip_numbers(), vec![1, 2, 3]);
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let capacity = 4;
        let mut buffer = OutputBuffer::new(capacity);
        let arrivals = [5u64, 2, 9, 1, 7, 3, 8, 6, 4, 10];

        for (count, n) in arrivals.iter().enumerate() {
            buffer.insert(processed(*n));

            let mut seen: Vec<u64> = arrivals[..=count].to_vec();
            seen.sort_unstable();
            let expected: Vec<u64> = seen
                .iter()
                .rev()
                .take(capacity)
                .rev()
                .copied()
                .collect();

            assert_eq!(buffer.len(), (count + 1).min(capacity));
            assert_eq!(buffer.clip_numbers(), expected);
        }
    }

    #[test]
    fn test_eviction_outcomes() {
        let mut buffer = OutputBuffer::new(2);
        assert_eq!(buffer.insert(processed(4)), InsertOutcome::Inserted);
        assert_eq!(buffer.insert(processed(5)), InsertOutcome::Inserted);
        assert_eq!(buffer.insert(processed(6)), InsertOutcome::Evicted(4));
        assert_eq!(buffer.insert(processed(1)), InsertOutcome::Rejected);
        assert_eq!(buffer.insert(processed(6)), InsertOutcome::Replaced);
        assert_eq!(buffer.clip_numbers(), vec![5, 6]);
    }

    #[test]
    fn test_selection_prefers_second_newest() {
        let mut buffer = OutputBuffer::default();
        assert!(buffer.select_for_delivery().is_none());

        buffer.insert(processed(5));
        assert_eq!(buffer.select_for_delivery().unwrap().clip_number, 5);

        buffer.insert(processed(7));
        buffer.insert(processed(6));
        assert_eq!(buffer.select_for_delivery().unwrap().clip_number, 6);
        // Selection does not consume.
        assert_eq!(buffer.select_for_delivery().unwrap().clip_number, 6);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_get_after_eviction() {
        let mut buffer = OutputBuffer::new(1);
        buffer.insert(processed(1));
        buffer.insert(processed(2));
        assert!(buffer.get(1).is_none());
        assert_eq!(&buffer.get(2).unwrap().payload[..], b"clip-2");
    }
}
