//! Session-scoped deduplication of admitted file names.
//!
//! Once a file name has been admitted it is never admitted again for the
//! lifetime of the process, even if a file with that name later reappears
//! with different content. The record is never persisted: restarting the
//! engine is the only way to re-admit a name.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Record of file names admitted during this session.
#[derive(Debug, Default)]
pub struct Deduplicator {
    admitted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `file_name` as admitted.
    ///
    /// Returns false, leaving the record untouched, if the name was admitted
    /// before.
    pub fn admit(&self, file_name: &str) -> bool {
        self.admit_at(file_name, Utc::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit admission time.
    pub fn admit_at(&self, file_name: &str, at: DateTime<Utc>) -> bool {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        if admitted.contains_key(file_name) {
            return false;
        }
        admitted.insert(file_name.to_string(), at);
        true
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(file_name)
    }

    /// When `file_name` was admitted, if it was.
    pub fn admitted_at(&self, file_name: &str) -> Option<DateTime<Utc>> {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
