use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::status::QueueItemView;

/// A file waiting for its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub ordinal: u64,
    pub file_name: String,
    pub path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
}

/// Pending files in admission order.
///
/// Ordinals increase monotonically, so popping always returns the entry
/// that was admitted first.
#[derive(Debug, Default)]
pub struct IngestQueue {
    entries: BTreeMap<u64, QueueEntry>,
    next_ordinal: u64,
}

impl IngestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file. Returns its ordinal.
    pub fn push(&mut self, file_name: String, path: PathBuf, now: DateTime<Utc>) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.entries.insert(
            ordinal,
            QueueEntry {
                ordinal,
                file_name,
                path,
                enqueued_at: now,
            },
        );
        ordinal
    }

    /// Remove and return the oldest entry.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_first().map(|(_, entry)| entry)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.values().any(|e| e.file_name == file_name)
    }

    pub fn names(&self) -> HashSet<String> {
        self.entries.values().map(|e| e.file_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue contents for the status snapshot, 1-based positions.
    pub fn views(&self) -> Vec<QueueItemView> {
        self.entries
            .values()
            .enumerate()
            .map(|(i, e)| QueueItemView {
                position: i + 1,
                file_name: e.file_name.clone(),
                enqueued_at: e.enqueued_at,
            })
            .collect()
    }
}
