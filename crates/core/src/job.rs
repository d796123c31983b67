//! A single file's trip through the pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Queued,
    Claimed,
    Stage1Running,
    Stage2Running,
    Cleanup,
    Done,
    Error,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "QUEUED",
            JobStage::Claimed => "CLAIMED",
            JobStage::Stage1Running => "STAGE1_RUNNING",
            JobStage::Stage2Running => "STAGE2_RUNNING",
            JobStage::Cleanup => "CLEANUP",
            JobStage::Done => "DONE",
            JobStage::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Error)
    }

    /// Legal transitions of the job state machine.
    pub fn can_transition_to(&self, next: JobStage) -> bool {
        use JobStage::*;
        matches!(
            (self, next),
            (Queued, Claimed)
                | (Claimed, Stage1Running)
                | (Stage1Running, Stage2Running)
                | (Stage2Running, Cleanup)
                | (Cleanup, Done)
                | (Claimed, Error)
                | (Stage1Running, Error)
                | (Stage2Running, Error)
                | (Cleanup, Error)
        )
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The source could not be moved into the processing folder.
    SourceUnavailable,
    ColorProcessingFailed,
    TranscodeFailed,
    /// The source could not be archived after a successful transcode.
    ArchiveFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SourceUnavailable => "SOURCE_UNAVAILABLE",
            FailureReason::ColorProcessingFailed => "COLOR_PROCESSING_FAILED",
            FailureReason::TranscodeFailed => "TRANSCODE_FAILED",
            FailureReason::ArchiveFailed => "ARCHIVE_FAILED",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    Success {
        output_path: PathBuf,
    },
    Failure {
        reason: FailureReason,
        details: String,
    },
}

/// A stage change the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStage,
    pub to: JobStage,
}

/// The active unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub file_name: String,
    /// Current location of the source; follows the file as it moves.
    pub source_path: PathBuf,
    pub stage: JobStage,
    /// 0-100, reset on every stage change.
    pub progress: f32,
    pub stage_started_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(file_name: impl Into<String>, source_path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            source_path,
            stage: JobStage::Queued,
            progress: 0.0,
            stage_started_at: now,
            started_at: now,
            finished_at: None,
            outcome: None,
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> String {
        std::path::Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file_name.clone())
    }

    /// Move to `next`, resetting progress.
    pub fn advance(&mut self, next: JobStage, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.stage.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.progress = 0.0;
        self.stage_started_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Raise progress within the current stage. Lower values are ignored.
    pub fn set_progress(&mut self, percent: f32) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    /// Finish with a success.
    pub fn succeed(&mut self, output_path: PathBuf, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.advance(JobStage::Done, now)?;
        self.outcome = Some(JobOutcome::Success { output_path });
        Ok(())
    }

    /// Finish with a failure.
    pub fn fail(
        &mut self,
        reason: FailureReason,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.advance(JobStage::Error, now)?;
        self.outcome = Some(JobOutcome::Failure {
            reason,
            details: details.into(),
        });
        Ok(())
    }

    /// Seconds spent in the current stage.
    pub fn stage_elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.stage_started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}
