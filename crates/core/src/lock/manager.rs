use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts before giving up when the lock file keeps being replaced
/// underneath us.
const MAX_ATTEMPTS: usize = 3;

/// Errors raised while claiming or releasing the instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another live process holds the lock.
    #[error("another instance is already running (PID {pid}, since {acquired_at})")]
    Held {
        pid: u32,
        acquired_at: DateTime<Utc>,
        path: PathBuf,
    },

    /// The lock is held but its holder has not recorded itself yet.
    #[error("another instance is already running (lock held on {path})")]
    Contended { path: PathBuf },

    /// The lock file could not be read, written or removed.
    #[error("lock file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the running process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Acquires the instance lock.
pub struct LockManager;

impl LockManager {
    /// Claim the lock at `path`.
    ///
    /// The file is held with an exclusive advisory lock for the lifetime of
    /// the returned guard, so two callers can never both succeed. A file that
    /// is not locked but names a process that is still running also counts
    /// as held. Unreadable files and dead holders are stale and replaced.
    pub fn acquire(path: &Path) -> Result<LockGuard, LockError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(|e| io_error(path, e))?;

            if let Err(e) = file.try_lock_exclusive() {
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    return Err(Self::held_by_other(path));
                }
                return Err(io_error(path, e));
            }

            // A releasing holder unlinks the file; our handle may point at
            // the removed inode.
            if !refers_to(&file, path) {
                debug!(attempt, "Lock file {} was replaced, retrying", path.display());
                continue;
            }

            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .map_err(|e| io_error(path, e))?;
            Self::check_recorded_holder(path, &contents)?;

            let info = LockInfo::current();
            Self::write(&mut file, path, &info)?;
            info!(pid = info.pid, "Acquired instance lock {}", path.display());

            return Ok(LockGuard {
                path: path.to_path_buf(),
                info,
                file: Some(file),
            });
        }

        Err(Self::held_by_other(path))
    }

    /// Read the lock file, `None` if there is none.
    pub fn read(path: &Path) -> Result<Option<LockInfo>, LockError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            io_error(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Reject a lock file left by a live process that does not hold the
    /// advisory lock; warn about anything else already in the file.
    fn check_recorded_holder(path: &Path, contents: &str) -> Result<(), LockError> {
        if contents.trim().is_empty() {
            return Ok(());
        }

        match serde_json::from_str::<LockInfo>(contents) {
            Ok(existing)
                if existing.pid != std::process::id() && is_process_alive(existing.pid) =>
            {
                Err(LockError::Held {
                    pid: existing.pid,
                    acquired_at: existing.acquired_at,
                    path: path.to_path_buf(),
                })
            }
            Ok(existing) => {
                warn!(
                    pid = existing.pid,
                    "Replacing stale lock file {} (holder is not running)",
                    path.display()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Replacing unreadable lock file {}: {}", path.display(), e);
                Ok(())
            }
        }
    }

    fn held_by_other(path: &Path) -> LockError {
        match Self::read(path) {
            Ok(Some(existing)) => LockError::Held {
                pid: existing.pid,
                acquired_at: existing.acquired_at,
                path: path.to_path_buf(),
            },
            _ => LockError::Contended {
                path: path.to_path_buf(),
            },
        }
    }

    fn write(file: &mut File, path: &Path, info: &LockInfo) -> Result<(), LockError> {
        let json = serde_json::to_string_pretty(info)
            .map_err(|e| io_error(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        file.set_len(0).map_err(|e| io_error(path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_error(path, e))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| io_error(path, e))
    }

    fn remove(path: &Path) -> Result<(), LockError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Whether the open handle is still the file found at `path`.
#[cfg(unix)]
fn refers_to(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn refers_to(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Held instance lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
    /// Open handle carrying the advisory lock; `None` once released.
    file: Option<File>,
}

impl LockGuard {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<(), LockError> {
        // Unlink before closing the handle so a waiting opener sees the
        // inode change.
        let result = LockManager::remove(&self.path);
        self.file.take();
        result?;
        info!("Released instance lock {}", self.path.display());
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(e) = LockManager::remove(&self.path) {
            warn!("Failed to remove lock file on drop: {}", e);
        } else {
            debug!("Lock file removed on drop: {}", self.path.display());
        }
        drop(file);
    }
}

/// Whether a process with this PID is currently running on this host.
pub fn is_process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}
