//! Startup cleanup of artifacts left behind by a previous run.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::fsops::{list_files, remove_if_exists};
use crate::pipeline::INTERMEDIATE_SUFFIX;
use crate::status::StatusStore;

/// What housekeeping found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    /// Stage 1 intermediates deleted from the temp folder.
    pub removed_intermediates: Vec<PathBuf>,
    /// Files left in the processing folder. They are reported, not moved.
    pub stranded_files: Vec<String>,
    /// File the previous run was working on when it stopped, if any.
    pub interrupted_job: Option<String>,
}

fn is_intermediate(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with(INTERMEDIATE_SUFFIX))
}

/// Delete leftover `*_intermediate.*` files in `temp_dir`.
pub async fn remove_leftover_intermediates(temp_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in list_files(temp_dir)? {
        if !is_intermediate(&entry.path) {
            continue;
        }
        match remove_if_exists(&entry.path).await {
            Ok(true) => {
                info!("Removed leftover intermediate {}", entry.path.display());
                removed.push(entry.path);
            }
            Ok(false) => {}
            Err(e) => warn!(
                "Failed to remove leftover intermediate {}: {}",
                entry.path.display(),
                e
            ),
        }
    }
    Ok(removed)
}

/// Run all startup checks against the configured folders.
///
/// Problems are logged and never fatal.
pub async fn run_housekeeping(config: &Config) -> HousekeepingReport {
    let mut report = HousekeepingReport::default();

    match remove_leftover_intermediates(&config.paths.temp).await {
        Ok(removed) => report.removed_intermediates = removed,
        Err(e) => warn!(
            "Cannot scan temp folder {}: {}",
            config.paths.temp.display(),
            e
        ),
    }

    match list_files(&config.paths.processing) {
        Ok(entries) => {
            for entry in entries {
                warn!(
                    "File {} was left in the processing folder by a previous run; it will not be retried",
                    entry.name
                );
                report.stranded_files.push(entry.name);
            }
        }
        Err(e) => warn!(
            "Cannot scan processing folder {}: {}",
            config.paths.processing.display(),
            e
        ),
    }

    match StatusStore::read_status_file(&config.paths.status_file) {
        Ok(Some(snapshot)) => {
            if let Some(job) = snapshot.active_job {
                warn!(
                    "Previous run stopped while processing {} ({})",
                    job.file_name, job.stage
                );
                report.interrupted_job = Some(job.file_name);
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Cannot read previous status file: {}", e),
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobStage};
    use crate::status::{ActiveJobView, StatusSnapshot};
    use crate::testing::fixtures::config_in;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_is_intermediate() {
        assert!(is_intermediate(Path::new("/t/A001_intermediate.mov")));
        assert!(!is_intermediate(Path::new("/t/A001.mov")));
        assert!(!is_intermediate(Path::new("/t/intermediate_A001.mov")));
    }

    #[tokio::test]
    async fn test_removes_only_intermediates() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("A001_intermediate.mov"), b"x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"keep").unwrap();

        let removed = remove_leftover_intermediates(temp.path()).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert!(!temp.path().join("A001_intermediate.mov").exists());
        assert!(temp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_full_report() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());
        for dir in ["temp", "processing", "_internal"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        std::fs::write(root.path().join("temp/B002_intermediate.mov"), b"x").unwrap();
        std::fs::write(root.path().join("processing/B002.mov"), b"x").unwrap();

        let now = Utc::now();
        let mut job = Job::new("B002.mov", root.path().join("processing/B002.mov"), now);
        job.advance(JobStage::Claimed, now).unwrap();
        job.advance(JobStage::Stage1Running, now).unwrap();
        let mut snapshot = StatusSnapshot::idle(now);
        snapshot.active_job = Some(ActiveJobView::from_job(&job, now));
        std::fs::write(
            &config.paths.status_file,
            serde_json::to_string_pretty(&snapshot).unwrap(),
        )
        .unwrap();

        let report = run_housekeeping(&config).await;

        assert_eq!(report.removed_intermediates.len(), 1);
        assert_eq!(report.stranded_files, vec!["B002.mov".to_string()]);
        assert_eq!(report.interrupted_job.as_deref(), Some("B002.mov"));
        // Stranded files stay where they are.
        assert!(root.path().join("processing/B002.mov").exists());
    }

    #[tokio::test]
    async fn test_missing_folders_are_not_fatal() {
        let root = TempDir::new().unwrap();
        let config = config_in(root.path());

        let report = run_housekeeping(&config).await;
        assert_eq!(report, HousekeepingReport::default());
    }
}
