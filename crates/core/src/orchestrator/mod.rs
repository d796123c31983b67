//! Ingest orchestrator.
//!
//! The orchestrator owns the queue and drives files through the pipeline:
//! - **Watch**: periodic polls of the watch folder admit stable files
//! - **Processing**: sequential, one job at a time, in admission order

mod config;
mod control;
mod queue;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use control::EngineControl;
pub use queue::{IngestQueue, QueueEntry};
pub use runner::{IngestOrchestrator, TransitionCallback};
pub use types::OrchestratorError;
