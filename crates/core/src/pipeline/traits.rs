//! Seams between the pipeline and the tools it drives.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::StageError;
use crate::job::Job;

/// Stage 1: applies the camera's embedded look and writes an intermediate.
#[async_trait]
pub trait ColorProcessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run the color stage from `input` into `output`.
    async fn process(&self, input: &Path, output: &Path) -> Result<(), StageError>;
}

/// Stage 2: transcodes the intermediate into the delivery format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Duration of a media file in seconds.
    async fn probe_duration(&self, input: &Path) -> Result<f64, StageError>;

    /// Transcode `input` into `output`.
    ///
    /// Percentages (0-100) are sent on `progress_tx` when `duration_secs` is
    /// known. If the receiver is gone, transcoding continues silently.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        duration_secs: Option<f64>,
        progress_tx: mpsc::Sender<f32>,
    ) -> Result<(), StageError>;
}

/// Turns one line of tool output into a completion percentage.
pub trait ProgressParser: Send {
    fn parse_line(&mut self, line: &str) -> Option<f32>;
}

/// Receives job updates from the pipeline runner.
#[async_trait]
pub trait JobObserver: Send + Sync {
    /// Called after every stage change.
    async fn on_transition(&self, job: &Job);

    /// Called while a stage runs, at most once per progress interval.
    async fn on_progress(&self, job: &Job);
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl JobObserver for NoopObserver {
    async fn on_transition(&self, _job: &Job) {}

    async fn on_progress(&self, _job: &Job) {}
}
