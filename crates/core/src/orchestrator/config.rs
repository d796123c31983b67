//! Orchestrator configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, ProcessingConfig};

/// Configuration for the ingest orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Folder the watch loop polls.
    pub watch_dir: PathBuf,
    /// Watcher filters and timing.
    pub processing: ProcessingConfig,
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            watch_dir: config.paths.watch.clone(),
            processing: config.processing.clone(),
        }
    }

    /// How often the watch loop polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.processing.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval() {
        let config = OrchestratorConfig {
            watch_dir: PathBuf::from("/watch"),
            processing: ProcessingConfig::default(),
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
    }
}
