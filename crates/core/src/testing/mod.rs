//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the external tools so the whole pipeline can be
//! exercised without the color-science CLI or ffmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_core::testing::{fixtures, MockColorProcessor, MockTranscoder};
//!
//! let color = MockColorProcessor::new();
//! let transcoder = MockTranscoder::new();
//!
//! // Schedule a stage 2 failure for B002.mov
//! transcoder.fail_for_stem("B002").await;
//! ```

mod mock_color;
mod mock_transcoder;

pub use mock_color::{MockColorProcessor, RecordedColorRun};
pub use mock_transcoder::{MockTranscoder, RecordedTranscode};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::config::{load_config_from_str, Config};

    /// Configuration rooted at `root`, with one subfolder per managed folder
    /// and the state files under `root/_internal`.
    pub fn config_in(root: &Path) -> Config {
        let toml = format!(
            r#"
[paths]
watch = "{root}/watch"
processing = "{root}/processing"
output = "{root}/output"
processed = "{root}/processed"
temp = "{root}/temp"
error = "{root}/error"
logs = "{root}/_internal/logs"
status_file = "{root}/_internal/status.json"
history_file = "{root}/_internal/history.json"
lock_file = "{root}/_internal/ingest_engine.lock"

[tools]
art_cli = "/bin/true"
ffmpeg = "/bin/true"
ffprobe = "/bin/true"

[color]
target_colorspace = "Rec709"

[processing]
min_file_age_secs = 10
poll_interval_secs = 15
progress_interval_ms = 10

[server]
host = "127.0.0.1"
port = 8080
"#,
            root = root.display()
        );
        load_config_from_str(&toml).expect("fixture config must parse")
    }

    /// Create every managed folder and the state directory.
    pub fn create_folders(config: &Config) {
        for (_, dir) in config.paths.managed_folders() {
            std::fs::create_dir_all(dir).expect("Failed to create folder");
        }
        std::fs::create_dir_all(&config.paths.logs).expect("Failed to create logs folder");
    }

    /// Write `size` bytes of filler to `dir/name`.
    pub fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0x5a; size]).expect("Failed to write file");
        path
    }

    /// Names of the regular files in `dir`, sorted. Missing folder -> empty.
    pub fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
