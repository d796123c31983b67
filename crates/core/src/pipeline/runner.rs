//! Drives one job from claim to a terminal stage.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::error::StageError;
use super::traits::{ColorProcessor, JobObserver, Transcoder};
use crate::config::Config;
use crate::fsops::{available_path, move_file, remove_if_exists};
use crate::job::{FailureReason, InvalidTransition, Job, JobStage};

/// Suffix appended to the stem of a stage 1 intermediate.
pub const INTERMEDIATE_SUFFIX: &str = "_intermediate";

/// Folders and timing used by the runner.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub processing_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub error_dir: PathBuf,
    /// Extension of the deliverable, without the dot.
    pub output_extension: String,
    /// Interval between progress reports while a stage runs.
    pub progress_interval: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            processing_dir: config.paths.processing.clone(),
            temp_dir: config.paths.temp.clone(),
            output_dir: config.paths.output.clone(),
            processed_dir: config.paths.processed.clone(),
            error_dir: config.paths.error.clone(),
            output_extension: config.transcode.container.clone(),
            progress_interval: Duration::from_millis(config.processing.progress_interval_ms.max(1)),
        }
    }
}

/// Runs claimed jobs through both stages.
pub struct PipelineRunner<C: ColorProcessor, T: Transcoder> {
    config: PipelineConfig,
    color: Arc<C>,
    transcoder: Arc<T>,
}

impl<C: ColorProcessor, T: Transcoder> PipelineRunner<C, T> {
    pub fn new(config: PipelineConfig, color: C, transcoder: T) -> Self {
        Self::with_shared(config, Arc::new(color), Arc::new(transcoder))
    }

    /// Build a runner around tool drivers the caller keeps a handle to.
    pub fn with_shared(config: PipelineConfig, color: Arc<C>, transcoder: Arc<T>) -> Self {
        Self {
            config,
            color,
            transcoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// `{temp}/{stem}_intermediate.mov`
    pub fn intermediate_path(&self, job: &Job) -> PathBuf {
        self.config
            .temp_dir
            .join(format!("{}{}.mov", job.stem(), INTERMEDIATE_SUFFIX))
    }

    /// `{output}/{stem}.{container}`
    pub fn output_path(&self, job: &Job) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{}", job.stem(), self.config.output_extension))
    }

    /// Run a claimed job to `DONE` or `ERROR`.
    ///
    /// Tool failures end the job in `ERROR`; they are not returned as errors.
    /// An error here means the job was not in the `CLAIMED` stage.
    pub async fn run(&self, job: &mut Job, observer: &dyn JobObserver) -> Result<(), InvalidTransition> {
        if job.stage != JobStage::Claimed {
            return Err(InvalidTransition {
                from: job.stage,
                to: JobStage::Stage1Running,
            });
        }

        // Claim: watch -> processing
        let claimed = self.destination(&self.config.processing_dir, job);
        if let Err(e) = move_file(&job.source_path, &claimed).await {
            return self
                .fail(job, FailureReason::SourceUnavailable, e.to_string(), &[], observer)
                .await;
        }
        job.source_path = claimed;
        info!(job_id = %job.id, file = %job.file_name, "Claimed source into processing");

        // Stage 1: color processing
        let intermediate = self.intermediate_path(job);
        self.transition(job, JobStage::Stage1Running, observer).await?;
        let source = job.source_path.clone();
        let stage1 = {
            let run = self.color.process(&source, &intermediate);
            self.with_heartbeat(job, observer, run).await
        };
        let stage1 = stage1.and_then(|()| expect_output(&intermediate));
        if let Err(e) = stage1 {
            return self
                .fail(
                    job,
                    FailureReason::ColorProcessingFailed,
                    e.details(),
                    &[intermediate.as_path()],
                    observer,
                )
                .await;
        }
        info!(job_id = %job.id, "{} finished: {}", self.color.name(), intermediate.display());

        // Stage 2: transcode
        let output = self.output_path(job);
        self.transition(job, JobStage::Stage2Running, observer).await?;
        let stage2 = self
            .transcode_with_progress(job, observer, &intermediate, &output)
            .await
            .and_then(|()| expect_output(&output));
        if let Err(e) = stage2 {
            return self
                .fail(
                    job,
                    FailureReason::TranscodeFailed,
                    e.details(),
                    &[output.as_path(), intermediate.as_path()],
                    observer,
                )
                .await;
        }
        info!(job_id = %job.id, "{} finished: {}", self.transcoder.name(), output.display());

        // Cleanup: drop the intermediate, archive the source
        self.transition(job, JobStage::Cleanup, observer).await?;
        if let Err(e) = remove_if_exists(&intermediate).await {
            warn!("Failed to delete intermediate {}: {}", intermediate.display(), e);
        }

        let archived = self.destination(&self.config.processed_dir, job);
        if let Err(e) = move_file(&job.source_path, &archived).await {
            return self
                .fail(job, FailureReason::ArchiveFailed, e.to_string(), &[output.as_path()], observer)
                .await;
        }
        job.source_path = archived;

        job.succeed(output.clone(), Utc::now())?;
        info!(job_id = %job.id, file = %job.file_name, "Job done: {}", output.display());
        observer.on_transition(job).await;
        Ok(())
    }

    async fn transition(
        &self,
        job: &mut Job,
        next: JobStage,
        observer: &dyn JobObserver,
    ) -> Result<(), InvalidTransition> {
        job.advance(next, Utc::now())?;
        info!(job_id = %job.id, file = %job.file_name, stage = %next, "Job stage changed");
        observer.on_transition(job).await;
        Ok(())
    }

    /// Await `work`, reporting the job once per progress interval meanwhile.
    async fn with_heartbeat<F, R>(&self, job: &Job, observer: &dyn JobObserver, work: F) -> R
    where
        F: Future<Output = R>,
    {
        tokio::pin!(work);
        let mut ticker = tokio::time::interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = ticker.tick() => observer.on_progress(job).await,
            }
        }
    }

    async fn transcode_with_progress(
        &self,
        job: &mut Job,
        observer: &dyn JobObserver,
        input: &Path,
        output: &Path,
    ) -> Result<(), StageError> {
        let duration = match self.transcoder.probe_duration(input).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!(job_id = %job.id, "Duration unknown, progress unavailable: {}", e);
                None
            }
        };

        let (progress_tx, mut progress_rx) = mpsc::channel(64);
        let work = self.transcoder.transcode(input, output, duration, progress_tx);
        tokio::pin!(work);

        let mut ticker = tokio::time::interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut changed = false;

        loop {
            tokio::select! {
                result = &mut work => return result,
                Some(percent) = progress_rx.recv() => {
                    changed |= job.set_progress(percent);
                }
                _ = ticker.tick() => {
                    if changed {
                        observer.on_progress(job).await;
                        changed = false;
                    }
                }
            }
        }
    }

    /// Where the source goes in `dir`; earlier files of the same name are kept.
    fn destination(&self, dir: &Path, job: &Job) -> PathBuf {
        let path = available_path(dir, &job.file_name);
        if path.file_name() != Some(std::ffi::OsStr::new(&job.file_name)) {
            warn!(
                job_id = %job.id,
                "{} already exists in {}, using {}",
                job.file_name,
                dir.display(),
                path.display()
            );
        }
        path
    }

    /// Move the source to the error folder, remove `partials`, finish in `ERROR`.
    async fn fail(
        &self,
        job: &mut Job,
        reason: FailureReason,
        details: String,
        partials: &[&Path],
        observer: &dyn JobObserver,
    ) -> Result<(), InvalidTransition> {
        error!(job_id = %job.id, file = %job.file_name, %reason, "Job failed: {}", details);

        for partial in partials {
            match remove_if_exists(partial).await {
                Ok(true) => info!("Removed partial artifact {}", partial.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove {}: {}", partial.display(), e),
            }
        }

        if job.source_path.exists() {
            let destination = self.destination(&self.config.error_dir, job);
            match move_file(&job.source_path, &destination).await {
                Ok(()) => job.source_path = destination,
                Err(e) => error!("Failed to move source to error folder: {}", e),
            }
        } else {
            warn!("Source {} no longer exists", job.source_path.display());
        }

        job.fail(reason, details, Utc::now())?;
        observer.on_transition(job).await;
        Ok(())
    }
}

fn expect_output(path: &Path) -> Result<(), StageError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StageError::OutputMissing {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoopObserver;
    use crate::testing::{MockColorProcessor, MockTranscoder};
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        config: PipelineConfig,
        watch: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = TempDir::new().unwrap();
        let make = |name: &str| {
            let dir = root.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            dir
        };
        let config = PipelineConfig {
            processing_dir: make("processing"),
            temp_dir: make("temp"),
            output_dir: make("output"),
            processed_dir: make("processed"),
            error_dir: make("error"),
            output_extension: "mxf".to_string(),
            progress_interval: Duration::from_millis(10),
        };
        let watch = make("watch");
        Dirs {
            _root: root,
            config,
            watch,
        }
    }

    fn claimed_job(dirs: &Dirs, name: &str) -> Job {
        let source = dirs.watch.join(name);
        std::fs::write(&source, b"camera data").unwrap();
        let mut job = Job::new(name, source, Utc::now());
        job.advance(JobStage::Claimed, Utc::now()).unwrap();
        job
    }

    #[test]
    fn test_artifact_paths() {
        let dirs = dirs();
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let job = Job::new("A001.mov", dirs.watch.join("A001.mov"), Utc::now());
        assert_eq!(
            runner.intermediate_path(&job),
            dirs.config.temp_dir.join("A001_intermediate.mov")
        );
        assert_eq!(runner.output_path(&job), dirs.config.output_dir.join("A001.mxf"));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let dirs = dirs();
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let mut job = claimed_job(&dirs, "A001.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Done);
        assert!(dirs.config.output_dir.join("A001.mxf").exists());
        assert!(dirs.config.processed_dir.join("A001.mov").exists());
        assert!(!dirs.config.temp_dir.join("A001_intermediate.mov").exists());
        assert!(!dirs.watch.join("A001.mov").exists());
        assert_eq!(job.source_path, dirs.config.processed_dir.join("A001.mov"));
    }

    #[tokio::test]
    async fn test_earlier_archived_source_is_kept() {
        let dirs = dirs();
        std::fs::write(dirs.config.processed_dir.join("A001.mov"), b"previous session").unwrap();
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let mut job = claimed_job(&dirs, "A001.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Done);
        let earlier = dirs.config.processed_dir.join("A001.mov");
        assert_eq!(std::fs::read(&earlier).unwrap(), b"previous session");
        let archived = dirs.config.processed_dir.join("A001_1.mov");
        assert_eq!(std::fs::read(&archived).unwrap(), b"camera data");
        assert_eq!(job.source_path, archived);
    }

    #[tokio::test]
    async fn test_earlier_failed_source_is_kept() {
        let dirs = dirs();
        std::fs::write(dirs.config.error_dir.join("B002.mov"), b"previous session").unwrap();
        let transcoder = MockTranscoder::new();
        transcoder.set_next_error("ffmpeg exited with code 1").await;
        let runner = PipelineRunner::new(dirs.config.clone(), MockColorProcessor::new(), transcoder);
        let mut job = claimed_job(&dirs, "B002.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Error);
        assert_eq!(
            std::fs::read(dirs.config.error_dir.join("B002.mov")).unwrap(),
            b"previous session"
        );
        assert_eq!(
            std::fs::read(dirs.config.error_dir.join("B002_1.mov")).unwrap(),
            b"camera data"
        );
    }

    #[tokio::test]
    async fn test_color_failure() {
        let dirs = dirs();
        let color = MockColorProcessor::new();
        color.set_next_error("art-cmd exited with code 2").await;
        let runner = PipelineRunner::new(dirs.config.clone(), color, MockTranscoder::new());
        let mut job = claimed_job(&dirs, "A001.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Error);
        assert!(matches!(
            job.outcome,
            Some(crate::job::JobOutcome::Failure {
                reason: FailureReason::ColorProcessingFailed,
                ..
            })
        ));
        assert!(dirs.config.error_dir.join("A001.mov").exists());
        assert!(!dirs.config.temp_dir.join("A001_intermediate.mov").exists());
    }

    #[tokio::test]
    async fn test_transcode_failure_removes_partials() {
        let dirs = dirs();
        let transcoder = MockTranscoder::new();
        transcoder.set_next_error("ffmpeg exited with code 1").await;
        transcoder.set_write_partial_output(true).await;
        let runner = PipelineRunner::new(dirs.config.clone(), MockColorProcessor::new(), transcoder);
        let mut job = claimed_job(&dirs, "B002.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Error);
        assert!(dirs.config.error_dir.join("B002.mov").exists());
        assert!(!dirs.config.output_dir.join("B002.mxf").exists());
        assert!(!dirs.config.temp_dir.join("B002_intermediate.mov").exists());
    }

    #[tokio::test]
    async fn test_vanished_source_is_unavailable() {
        let dirs = dirs();
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let mut job = claimed_job(&dirs, "A001.mov");
        std::fs::remove_file(dirs.watch.join("A001.mov")).unwrap();

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Error);
        assert!(matches!(
            job.outcome,
            Some(crate::job::JobOutcome::Failure {
                reason: FailureReason::SourceUnavailable,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_intermediate_is_color_failure() {
        let dirs = dirs();
        let color = MockColorProcessor::new();
        color.set_write_output(false).await;
        let runner = PipelineRunner::new(dirs.config.clone(), color, MockTranscoder::new());
        let mut job = claimed_job(&dirs, "A001.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        match job.outcome {
            Some(crate::job::JobOutcome::Failure { reason, details }) => {
                assert_eq!(reason, FailureReason::ColorProcessingFailed);
                assert!(details.contains("not produced"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_archive_failure_removes_deliverable() {
        let mut dirs = dirs();
        dirs.config.processed_dir = dirs.config.processed_dir.join("missing/nested");
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let mut job = claimed_job(&dirs, "A001.mov");

        runner.run(&mut job, &NoopObserver).await.unwrap();

        assert_eq!(job.stage, JobStage::Error);
        assert!(!dirs.config.output_dir.join("A001.mxf").exists());
        assert!(dirs.config.error_dir.join("A001.mov").exists());
    }

    #[tokio::test]
    async fn test_rejects_unclaimed_job() {
        let dirs = dirs();
        let runner = PipelineRunner::new(
            dirs.config.clone(),
            MockColorProcessor::new(),
            MockTranscoder::new(),
        );
        let mut job = Job::new("A001.mov", dirs.watch.join("A001.mov"), Utc::now());
        assert!(runner.run(&mut job, &NoopObserver).await.is_err());
    }
}
