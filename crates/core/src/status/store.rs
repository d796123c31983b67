use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{HistoryRecord, StatusSnapshot, HISTORY_CAP};

/// Errors from persisting or loading engine state.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
struct Pending {
    status: bool,
    history: bool,
}

/// Latest snapshot and bounded history, mirrored to disk.
///
/// Every write goes to a temporary file in the target's directory which is
/// then renamed over the previous file, so readers of the files never see a
/// partial document. A failed write leaves the previous file in place and is
/// retried on the next write or [`retry_pending`](Self::retry_pending).
#[derive(Debug)]
pub struct StatusStore {
    status_path: PathBuf,
    history_path: PathBuf,
    latest: RwLock<Arc<StatusSnapshot>>,
    history: RwLock<VecDeque<HistoryRecord>>,
    pending: Mutex<Pending>,
    /// Serializes file writes so an older snapshot never lands after a newer one.
    write_lock: Mutex<()>,
}

impl StatusStore {
    /// Open the store, loading history left by a previous run.
    ///
    /// A missing or unreadable history file starts an empty history.
    pub fn open(status_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        let status_path = status_path.into();
        let history_path = history_path.into();

        let history = match load_history(&history_path) {
            Ok(records) => {
                if !records.is_empty() {
                    info!("Loaded {} history records from {}", records.len(), history_path.display());
                }
                records
            }
            Err(e) => {
                warn!("Starting with empty history: {}", e);
                VecDeque::new()
            }
        };

        Self {
            status_path,
            history_path,
            latest: RwLock::new(Arc::new(StatusSnapshot::idle(Utc::now()))),
            history: RwLock::new(history),
            pending: Mutex::new(Pending::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Make `snapshot` the current state and persist it.
    ///
    /// The in-memory snapshot is updated even when the disk write fails.
    pub fn publish(&self, snapshot: StatusSnapshot) -> Result<(), StatusError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Arc::new(snapshot);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);

        let status_result = write_json_atomic(&self.status_path, snapshot.as_ref());
        self.set_pending(|p| p.status = status_result.is_err());
        let history_result = self.flush_history_if_pending();

        status_result.and(history_result)
    }

    /// Record a finished job at the head of the history log.
    pub fn append_history(&self, record: HistoryRecord) -> Result<(), StatusError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let records: Vec<HistoryRecord> = {
            let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
            history.push_front(record);
            history.truncate(HISTORY_CAP);
            history.iter().cloned().collect()
        };

        let result = write_json_atomic(&self.history_path, &records);
        self.set_pending(|p| p.history = result.is_err());
        result
    }

    /// Retry writes that failed earlier. No-op when nothing is pending.
    pub fn retry_pending(&self) -> Result<(), StatusError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let status_result = if self.pending().status {
            let snapshot = self.latest();
            let result = write_json_atomic(&self.status_path, snapshot.as_ref());
            if result.is_ok() {
                debug!("Status file write recovered");
            }
            self.set_pending(|p| p.status = result.is_err());
            result
        } else {
            Ok(())
        };

        let history_result = self.flush_history_if_pending();
        status_result.and(history_result)
    }

    /// Whether any artifact is waiting for a successful write.
    pub fn has_pending_writes(&self) -> bool {
        let pending = self.pending();
        pending.status || pending.history
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<StatusSnapshot> {
        Arc::clone(&self.latest.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// History records, newest first.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Read a status file written by this or a previous run.
    pub fn read_status_file(path: &Path) -> Result<Option<StatusSnapshot>, StatusError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StatusError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StatusError::Json {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn flush_history_if_pending(&self) -> Result<(), StatusError> {
        if !self.pending().history {
            return Ok(());
        }
        let records = self.history();
        let result = write_json_atomic(&self.history_path, &records);
        if result.is_ok() {
            debug!("History file write recovered");
        }
        self.set_pending(|p| p.history = result.is_err());
        result
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_pending(&self, f: impl FnOnce(&mut Pending)) {
        f(&mut self.pending());
    }
}

fn load_history(path: &Path) -> Result<VecDeque<HistoryRecord>, StatusError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(e) => {
            return Err(StatusError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut records: VecDeque<HistoryRecord> =
        serde_json::from_str(&contents).map_err(|e| StatusError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
    records.truncate(HISTORY_CAP);
    Ok(records)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StatusError> {
    let write_error = |source: std::io::Error| StatusError::Write {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(value).map_err(|e| StatusError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(&json).map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FailureReason;
    use crate::status::{Counters, EngineState, JobResult};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn store_in(dir: &Path) -> StatusStore {
        StatusStore::open(dir.join("status.json"), dir.join("history.json"))
    }

    fn record(name: &str) -> HistoryRecord {
        let now = Utc::now();
        HistoryRecord {
            job_id: Uuid::new_v4(),
            file_name: name.to_string(),
            started_at: now,
            finished_at: now,
            duration_secs: 0.0,
            result: JobResult::Failure,
            reason: Some(FailureReason::ColorProcessingFailed),
            details: Some("exit 1".to_string()),
            output_path: None,
        }
    }

    #[test]
    fn test_publish_updates_memory_and_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(dir.path());

        let mut snapshot = StatusSnapshot::idle(Utc::now());
        snapshot.counters = Counters {
            processed: 3,
            failed: 1,
            queued: 0,
        };
        store.publish(snapshot.clone()).unwrap();

        assert_eq!(*store.latest(), snapshot);
        let on_disk = StatusStore::read_status_file(store.status_path()).unwrap().unwrap();
        assert_eq!(on_disk, snapshot);
        assert!(!store.has_pending_writes());
    }

    #[test]
    fn test_history_is_newest_first_and_capped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(dir.path());

        for i in 0..(HISTORY_CAP + 5) {
            store.append_history(record(&format!("F{:03}.mov", i))).unwrap();
        }

        let history = store.history();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].file_name, "F104.mov");
        assert_eq!(history[HISTORY_CAP - 1].file_name, "F005.mov");
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(dir.path());
            store.append_history(record("A001.mov")).unwrap();
            store.append_history(record("B002.mov")).unwrap();
        }

        let reopened = store_in(dir.path());
        let names: Vec<_> = reopened.history().into_iter().map(|r| r.file_name).collect();
        assert_eq!(names, vec!["B002.mov", "A001.mov"]);
        // Counters are not restored.
        assert_eq!(reopened.latest().counters, Counters::default());
    }

    #[test]
    fn test_corrupt_history_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("history.json"), "{ not json").unwrap();
        let store = store_in(dir.path());
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_failed_write_is_retried() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("state");
        // A regular file where the state directory should be.
        std::fs::write(&blocked, b"").unwrap();
        let store = StatusStore::open(blocked.join("status.json"), blocked.join("history.json"));

        let snapshot = StatusSnapshot::idle(Utc::now());
        assert!(store.publish(snapshot.clone()).is_err());
        assert!(store.has_pending_writes());
        assert_eq!(*store.latest(), snapshot);

        std::fs::remove_file(&blocked).unwrap();
        store.retry_pending().unwrap();
        assert!(!store.has_pending_writes());
        assert!(blocked.join("status.json").exists());
    }

    #[test]
    fn test_status_file_is_pretty_json() {
        let dir = TempDir::new().unwrap();
        let store = store_in(dir.path());
        let first = StatusSnapshot::idle(Utc::now());
        store.publish(first.clone()).unwrap();

        let path = store.status_path().to_path_buf();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<StatusSnapshot>(&contents).is_ok());
        assert_eq!(
            StatusStore::read_status_file(&path).unwrap().unwrap().state,
            EngineState::Idle
        );
    }

    #[test]
    fn test_read_missing_status_file() {
        let dir = TempDir::new().unwrap();
        assert!(StatusStore::read_status_file(&dir.path().join("none.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(dir.path()));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..200u64 {
                    let mut snapshot = StatusSnapshot::idle(Utc::now());
                    snapshot.counters = Counters {
                        processed: i,
                        failed: i,
                        queued: i as usize,
                    };
                    store.publish(snapshot).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let c = store.latest().counters;
                        assert_eq!(c.processed, c.failed);
                        assert_eq!(c.processed as usize, c.queued);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.latest().counters.processed, 199);
    }
}
