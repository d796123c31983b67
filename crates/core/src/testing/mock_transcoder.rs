//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::pipeline::{StageError, Transcoder};

/// A recorded stage 2 invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTranscode {
    pub input: PathBuf,
    pub output: PathBuf,
    pub duration_secs: Option<f64>,
    pub success: bool,
}

/// Mock implementation of the Transcoder trait.
///
/// Writes a small deliverable and emits a fixed series of progress values.
/// Failures can be scheduled once or for inputs starting with a given stem.
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    transcodes: Arc<RwLock<Vec<RecordedTranscode>>>,
    next_error: Arc<RwLock<Option<String>>>,
    failing_stems: Arc<RwLock<HashSet<String>>>,
    duration_secs: Arc<RwLock<Option<f64>>>,
    progress_steps: Arc<RwLock<Vec<f32>>>,
    write_partial_output: Arc<RwLock<bool>>,
    delay_ms: Arc<RwLock<u64>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            transcodes: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_stems: Arc::new(RwLock::new(HashSet::new())),
            duration_secs: Arc::new(RwLock::new(Some(12.0))),
            progress_steps: Arc::new(RwLock::new(vec![25.0, 50.0, 75.0, 100.0])),
            write_partial_output: Arc::new(RwLock::new(false)),
            delay_ms: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn recorded_transcodes(&self) -> Vec<RecordedTranscode> {
        self.transcodes.read().await.clone()
    }

    pub async fn transcode_count(&self) -> usize {
        self.transcodes.read().await.len()
    }

    /// Fail the next transcode with this message.
    pub async fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    /// Fail every transcode whose input name starts with `stem`.
    pub async fn fail_for_stem(&self, stem: impl Into<String>) {
        self.failing_stems.write().await.insert(stem.into());
    }

    /// Duration reported by the probe. `None` makes the probe fail.
    pub async fn set_duration(&self, duration_secs: Option<f64>) {
        *self.duration_secs.write().await = duration_secs;
    }

    pub async fn set_progress_steps(&self, steps: Vec<f32>) {
        *self.progress_steps.write().await = steps;
    }

    /// Leave a half-written output behind when failing.
    pub async fn set_write_partial_output(&self, write: bool) {
        *self.write_partial_output.write().await = write;
    }

    /// Simulated transcode time, spread across the progress steps.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    async fn should_fail(&self, input: &Path) -> Option<String> {
        if let Some(message) = self.next_error.write().await.take() {
            return Some(message);
        }
        let name = input.file_name()?.to_string_lossy().to_string();
        let stems = self.failing_stems.read().await;
        stems
            .iter()
            .find(|stem| name.starts_with(stem.as_str()))
            .map(|stem| format!("Invalid data found when processing {}", stem))
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock-transcoder"
    }

    async fn probe_duration(&self, _input: &Path) -> Result<f64, StageError> {
        self.duration_secs
            .read()
            .await
            .ok_or_else(|| StageError::Probe {
                reason: "duration not available".to_string(),
            })
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration_secs: Option<f64>,
        progress_tx: mpsc::Sender<f32>,
    ) -> Result<(), StageError> {
        let steps = self.progress_steps.read().await.clone();
        let delay_ms = *self.delay_ms.read().await;
        let step_delay = Duration::from_millis(delay_ms / steps.len().max(1) as u64);

        if duration_secs.is_some() {
            for percent in steps {
                if !step_delay.is_zero() {
                    tokio::time::sleep(step_delay).await;
                }
                let _ = progress_tx.try_send(percent);
            }
        } else if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let failure = self.should_fail(input).await;
        self.transcodes.write().await.push(RecordedTranscode {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            duration_secs,
            success: failure.is_none(),
        });

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Some(message) = failure {
            if *self.write_partial_output.read().await {
                tokio::fs::write(output, b"partial").await?;
            }
            return Err(StageError::exit_status("ffmpeg", Some(1), message));
        }

        if !input.exists() {
            return Err(StageError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        tokio::fs::write(output, b"MXF deliverable").await?;
        Ok(())
    }
}
