//! Filesystem helpers shared by the watcher, the pipeline and the API.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Upper bound on bytes read from the end of a log file.
const MAX_TAIL_BYTES: u64 = 1024 * 1024;

/// Failure to move a file between managed folders.
#[derive(Debug, Error)]
#[error("failed to move {} to {}: {source}", from.display(), to.display())]
pub struct MoveError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A regular file in a managed folder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// List regular, non-hidden files in `dir`, sorted by name.
pub fn list_files(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        // Files can vanish between read_dir and stat; skip them quietly.
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        entries.push(FileEntry {
            name,
            path: entry.path(),
            size_bytes: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// `dir/file_name`, or `dir/{stem}_{n}.{ext}` with the lowest free `n`
/// when that name is taken.
pub fn available_path(dir: &Path, file_name: &str) -> PathBuf {
    let preferred = dir.join(file_name);
    if !preferred.exists() {
        return preferred;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let extension = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..=u32::MAX)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(preferred)
}

/// Move `source` to `destination`, falling back to copy + delete when the
/// two paths are on different filesystems.
///
/// An existing `destination` is never replaced.
pub async fn move_file(source: &Path, destination: &Path) -> Result<(), MoveError> {
    let wrap = |e: std::io::Error| MoveError {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: e,
    };

    if fs::try_exists(destination).await.map_err(wrap)? {
        return Err(wrap(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "destination already exists",
        )));
    }

    match fs::rename(source, destination).await {
        Ok(()) => return Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(
                "Cross-device move {} -> {}, copying",
                source.display(),
                destination.display()
            );
        }
        Err(e) => return Err(wrap(e)),
    }

    if let Err(e) = fs::copy(source, destination).await {
        let _ = fs::remove_file(destination).await;
        return Err(wrap(e));
    }
    fs::remove_file(source).await.map_err(wrap)
}

fn is_cross_device(e: &std::io::Error) -> bool {
    // EXDEV is 18 on Linux and macOS
    e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18)
}

/// Remove a file, returning whether it existed.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Last `max_lines` lines of a text file. A missing file yields no lines.
pub fn tail_lines(path: &Path, max_lines: usize) -> std::io::Result<Vec<String>> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    let start = len.saturating_sub(MAX_TAIL_BYTES);
    file.seek(SeekFrom::Start(start))?;

    let mut buffer = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buffer)?;
    let text = String::from_utf8_lossy(&buffer);

    let mut lines: Vec<&str> = text.lines().collect();
    if start > 0 && !lines.is_empty() {
        // First line is likely cut in half.
        lines.remove(0);
    }

    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}
