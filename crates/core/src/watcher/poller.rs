use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::stabilizer::{Observation, StabilizationDetector};
use crate::config::ProcessingConfig;
use crate::dedup::Deduplicator;
use crate::fsops::list_files;

/// A stable file that passed deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub first_seen: DateTime<Utc>,
    pub admitted_at: DateTime<Utc>,
}

/// Polls the watch folder and admits files once they are stable.
///
/// The watcher never touches the filesystem beyond listing it.
#[derive(Debug)]
pub struct FileWatcher {
    watch_dir: PathBuf,
    extensions: Vec<String>,
    detector: StabilizationDetector,
}

impl FileWatcher {
    pub fn new(watch_dir: impl Into<PathBuf>, processing: &ProcessingConfig) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            extensions: processing
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            detector: StabilizationDetector::new(std::time::Duration::from_secs(
                processing.min_file_age_secs,
            )),
        }
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Whether the file name carries one of the accepted extensions.
    pub fn accepts(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .map(|ext| {
                let ext = normalize_extension(&ext.to_string_lossy());
                self.extensions.contains(&ext)
            })
            .unwrap_or(false)
    }

    /// Number of files currently being evaluated.
    pub fn pending_candidates(&self) -> usize {
        self.detector.len()
    }

    /// Run one poll cycle at `now`.
    ///
    /// Returns newly admitted files sorted by file name. Names already in
    /// `dedup`, or for which `is_queued` returns true, are ignored.
    pub fn poll(
        &mut self,
        now: DateTime<Utc>,
        dedup: &Deduplicator,
        is_queued: impl Fn(&str) -> bool,
    ) -> Vec<AdmittedFile> {
        let entries = match list_files(&self.watch_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Cannot list watch folder {}: {}",
                    self.watch_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut present = HashSet::new();
        let mut admitted = Vec::new();

        for entry in entries {
            if !self.accepts(&entry.name) {
                continue;
            }
            if dedup.contains(&entry.name) || is_queued(&entry.name) {
                continue;
            }
            present.insert(entry.name.clone());

            match self
                .detector
                .observe(&entry.name, entry.path.clone(), entry.size_bytes, now)
            {
                Observation::Pending => {
                    debug!(file = %entry.name, size = entry.size_bytes, "Waiting for file to stabilize");
                }
                Observation::Dropped => {
                    debug!(file = %entry.name, "File shrank, restarting stabilization");
                    present.remove(&entry.name);
                }
                Observation::Stable => {
                    let Some(candidate) = self.detector.forget(&entry.name) else {
                        continue;
                    };
                    if !dedup.admit_at(&entry.name, now) {
                        debug!(file = %entry.name, "Already admitted this session");
                        continue;
                    }
                    info!(file = %entry.name, size = entry.size_bytes, "File stable, admitted");
                    admitted.push(AdmittedFile {
                        file_name: entry.name,
                        path: entry.path,
                        size_bytes: entry.size_bytes,
                        first_seen: candidate.first_seen,
                        admitted_at: now,
                    });
                }
            }
        }

        for name in self.detector.retain_present(&present) {
            debug!(file = %name, "Candidate disappeared from watch folder");
        }

        admitted.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        admitted
    }
}

/// Lowercase with a leading dot.
fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}
