use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

/// Number of size samples kept per candidate.
const MAX_SAMPLES: usize = 8;

/// One size observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSample {
    pub at: DateTime<Utc>,
    pub size: u64,
}

/// A file seen in the watch folder that has not been admitted yet.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub file_name: String,
    pub path: PathBuf,
    pub first_seen: DateTime<Utc>,
    /// Oldest first.
    pub samples: Vec<SizeSample>,
}

impl CandidateFile {
    fn new(file_name: &str, path: PathBuf, size: u64, now: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.to_string(),
            path,
            first_seen: now,
            samples: vec![SizeSample { at: now, size }],
        }
    }

    pub fn last_size(&self) -> Option<u64> {
        self.samples.last().map(|s| s.size)
    }

    fn push(&mut self, sample: SizeSample) {
        self.samples.push(sample);
        if self.samples.len() > MAX_SAMPLES {
            self.samples.remove(0);
        }
    }
}

/// Outcome of recording a size sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Still being evaluated.
    Pending,
    /// Finished being written; ready for admission.
    Stable,
    /// Shrunk since the previous sample; forgotten.
    Dropped,
}

/// Decides when a file has finished being written.
///
/// A candidate is stable once two consecutive samples report the same
/// non-zero size and more than `min_age` has passed since it was first seen.
#[derive(Debug)]
pub struct StabilizationDetector {
    min_age: Duration,
    candidates: HashMap<String, CandidateFile>,
}

impl StabilizationDetector {
    pub fn new(min_age: std::time::Duration) -> Self {
        Self {
            min_age: Duration::from_std(min_age).unwrap_or_else(|_| Duration::weeks(52)),
            candidates: HashMap::new(),
        }
    }

    /// Record the current size of `file_name`.
    pub fn observe(
        &mut self,
        file_name: &str,
        path: PathBuf,
        size: u64,
        now: DateTime<Utc>,
    ) -> Observation {
        let Some(candidate) = self.candidates.get_mut(file_name) else {
            self.candidates
                .insert(file_name.to_string(), CandidateFile::new(file_name, path, size, now));
            return Observation::Pending;
        };

        let previous = candidate.last_size().unwrap_or(0);
        if size < previous {
            self.candidates.remove(file_name);
            return Observation::Dropped;
        }

        candidate.path = path;
        candidate.push(SizeSample { at: now, size });

        let unchanged = size == previous;
        let old_enough = now - candidate.first_seen > self.min_age;
        if unchanged && size > 0 && old_enough {
            Observation::Stable
        } else {
            Observation::Pending
        }
    }

    /// Stop tracking a candidate, returning it if it was tracked.
    pub fn forget(&mut self, file_name: &str) -> Option<CandidateFile> {
        self.candidates.remove(file_name)
    }

    /// Drop every candidate not in `present`. Returns the dropped names.
    pub fn retain_present(&mut self, present: &HashSet<String>) -> Vec<String> {
        let gone: Vec<String> = self
            .candidates
            .keys()
            .filter(|name| !present.contains(*name))
            .cloned()
            .collect();
        for name in &gone {
            self.candidates.remove(name);
        }
        gone
    }

    pub fn get(&self, file_name: &str) -> Option<&CandidateFile> {
        self.candidates.get(file_name)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
