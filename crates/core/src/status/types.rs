use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{FailureReason, Job, JobOutcome, JobStage};

/// Maximum number of records kept in the history log.
pub const HISTORY_CAP: usize = 100;

/// Maximum number of events carried in a snapshot's log tail.
pub const LOG_TAIL_CAP: usize = 20;

/// Coarse engine state shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Processing,
    /// Pause requested while a job is still running.
    Pausing,
    Paused,
}

impl EngineState {
    pub fn derive(paused: bool, has_active_job: bool) -> Self {
        match (paused, has_active_job) {
            (false, false) => EngineState::Idle,
            (false, true) => EngineState::Processing,
            (true, true) => EngineState::Pausing,
            (true, false) => EngineState::Paused,
        }
    }
}

/// The job currently in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveJobView {
    pub job_id: Uuid,
    pub file_name: String,
    pub stage: JobStage,
    pub progress: f32,
    pub started_at: DateTime<Utc>,
    pub stage_started_at: DateTime<Utc>,
    pub stage_elapsed_secs: f64,
}

impl ActiveJobView {
    pub fn from_job(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            file_name: job.file_name.clone(),
            stage: job.stage,
            progress: job.progress,
            started_at: job.started_at,
            stage_started_at: job.stage_started_at,
            stage_elapsed_secs: job.stage_elapsed_secs(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemView {
    pub position: usize,
    pub file_name: String,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub processed: u64,
    pub failed: u64,
    pub queued: usize,
}

/// One line of the snapshot's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Complete engine state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: EngineState,
    pub paused: bool,
    pub active_job: Option<ActiveJobView>,
    pub queue: Vec<QueueItemView>,
    pub counters: Counters,
    pub log_tail: Vec<EngineEvent>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Idle engine with nothing queued.
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            state: EngineState::Idle,
            paused: false,
            active_job: None,
            queue: Vec::new(),
            counters: Counters::default(),
            log_tail: Vec::new(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Success,
    Failure,
}

/// Immutable record of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub job_id: Uuid,
    pub file_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub result: JobResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl HistoryRecord {
    /// Build the record for a job in a terminal stage. `None` otherwise.
    pub fn from_job(job: &Job) -> Option<Self> {
        let outcome = job.outcome.as_ref()?;
        let finished_at = job.finished_at?;
        let duration_secs = (finished_at - job.started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let (result, reason, details, output_path) = match outcome {
            JobOutcome::Success { output_path } => {
                (JobResult::Success, None, None, Some(output_path.clone()))
            }
            JobOutcome::Failure { reason, details } => {
                (JobResult::Failure, Some(*reason), Some(details.clone()), None)
            }
        };

        Some(Self {
            job_id: job.id,
            file_name: job.file_name.clone(),
            started_at: job.started_at,
            finished_at,
            duration_secs,
            result,
            reason,
            details,
            output_path,
        })
    }

    pub fn is_success(&self) -> bool {
        self.result == JobResult::Success
    }
}
