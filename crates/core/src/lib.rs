pub mod config;
pub mod dedup;
pub mod fsops;
pub mod housekeeping;
pub mod job;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod status;
pub mod testing;
pub mod watcher;

pub use config::{
    load_config, load_config_from_str, validate_config, verify_environment, Config, ConfigError,
};
pub use dedup::Deduplicator;
pub use housekeeping::{run_housekeeping, HousekeepingReport};
pub use job::{FailureReason, InvalidTransition, Job, JobOutcome, JobStage};
pub use lock::{LockError, LockGuard, LockInfo, LockManager};
pub use orchestrator::{
    EngineControl, IngestOrchestrator, OrchestratorConfig, OrchestratorError, TransitionCallback,
};
pub use pipeline::{
    ArtCliProcessor, ColorProcessor, FfmpegTranscoder, PipelineConfig, PipelineRunner, StageError,
    Transcoder,
};
pub use status::{HistoryRecord, StatusError, StatusSnapshot, StatusStore};
pub use watcher::FileWatcher;
