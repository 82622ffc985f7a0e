//! # Source Table
//!
//! Per-source duplicate suppression keyed on the record's embedded
//! timestamp. The table has a fixed capacity; what happens to sources
//! beyond it is decided by [`OverflowPolicy`].

use std::collections::VecDeque;

use serde::Deserialize;

use super::SourceId;

/// Default number of tracked sources
pub const DEFAULT_DEDUP_CAPACITY: usize = 10;

/// Behaviour when a new source arrives and the table is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Forward the record without tracking the source
    #[default]
    Passthrough,

    /// Evict the least recently updated source and track the new one
    EvictOldest,
}

/// Dedup decision for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// New source or new timestamp, forward it
    Fresh,

    /// Same timestamp as last seen from this source
    Duplicate,

    /// Table full under `Passthrough`, forwarded without tracking
    Untracked,
}

impl DedupVerdict {
    pub fn is_forwarded(self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceRecord {
    source: SourceId,
    last_timestamp: u32,
}

/// Fixed-capacity table of the last timestamp seen per source
///
/// Entries are kept in update order, least recently updated first.
#[derive(Debug)]
pub struct SourceTable {
    entries: VecDeque<SourceRecord>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl SourceTable {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Whether `source` currently has an entry
    pub fn tracks(&self, source: &SourceId) -> bool {
        self.entries.iter().any(|e| e.source == *source)
    }

    /// Check a record and update the table
    pub fn observe(&mut self, source: SourceId, timestamp: u32) -> DedupVerdict {
        if let Some(index) = self.entries.iter().position(|e| e.source == source) {
            if self.entries[index].last_timestamp == timestamp {
                return DedupVerdict::Duplicate;
            }

            // Move to the back so eviction picks the stalest source
            if let Some(mut entry) = self.entries.remove(index) {
                entry.last_timestamp = timestamp;
                self.entries.push_back(entry);
            }
            return DedupVerdict::Fresh;
        }

        if self.is_full() {
            match self.policy {
                OverflowPolicy::Passthrough => return DedupVerdict::Untracked,
                OverflowPolicy::EvictOldest => {
                    self.entries.pop_front();
                }
            }
        }

        // Zero capacity under EvictOldest still has nothing to store into
        if self.capacity == 0 {
            return DedupVerdict::Untracked;
        }

        self.entries.push_back(SourceRecord {
            source,
            last_timestamp: timestamp,
        });
        DedupVerdict::Fresh
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for SourceTable {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, OverflowPolicy::default())
    }
}
