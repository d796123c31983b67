//! Mock color processor for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::pipeline::{ColorProcessor, StageError};

/// A recorded stage 1 invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedColorRun {
    pub input: PathBuf,
    pub output: PathBuf,
    pub success: bool,
}

/// Mock implementation of the ColorProcessor trait.
///
/// By default it copies the input to the output, like a tool that always
/// succeeds. Failures can be scheduled once or per file stem.
#[derive(Debug, Clone)]
pub struct MockColorProcessor {
    runs: Arc<RwLock<Vec<RecordedColorRun>>>,
    next_error: Arc<RwLock<Option<String>>>,
    failing_stems: Arc<RwLock<HashSet<String>>>,
    write_output: Arc<RwLock<bool>>,
    delay_ms: Arc<RwLock<u64>>,
}

impl Default for MockColorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockColorProcessor {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_stems: Arc::new(RwLock::new(HashSet::new())),
            write_output: Arc::new(RwLock::new(true)),
            delay_ms: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded runs.
    pub async fn recorded_runs(&self) -> Vec<RecordedColorRun> {
        self.runs.read().await.clone()
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Fail the next run with this message.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    /// Fail every run whose input file stem equals `stem`.
    pub async fn fail_for_stem(&self, stem: impl Into<String>) {
        self.failing_stems.write().await.insert(stem.into());
    }

    /// Whether a successful run writes the output file.
    pub async fn set_write_output(&self, write: bool) {
        *self.write_output.write().await = write;
    }

    /// Simulated processing time.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    async fn should_fail(&self, input: &Path) -> Option<String> {
        if let Some(message) = self.next_error.write().await.take() {
            return Some(message);
        }
        let stem = input.file_stem()?.to_string_lossy().to_string();
        self.failing_stems
            .read()
            .await
            .contains(&stem)
            .then(|| format!("art-cmd rejected {}", stem))
    }
}

#[async_trait]
impl ColorProcessor for MockColorProcessor {
    fn name(&self) -> &str {
        "mock-color"
    }

    async fn process(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        let delay_ms = *self.delay_ms.read().await;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let failure = self.should_fail(input).await;
        self.runs.write().await.push(RecordedColorRun {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            success: failure.is_none(),
        });

        if let Some(message) = failure {
            return Err(StageError::exit_status("art-cmd", Some(1), message));
        }

        if !input.exists() {
            return Err(StageError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        if *self.write_output.read().await {
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(input, output).await?;
        }

        Ok(())
    }
}
