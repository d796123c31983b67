//! Engine status snapshots and job history.
//!
//! The store is the only thing the HTTP surface reads. Snapshots are
//! published whole, so a reader sees either the previous or the next state
//! and never a mix of the two.

mod store;
mod types;

pub use store::{StatusError, StatusStore};
pub use types::{
    ActiveJobView, Counters, EngineEvent, EngineState, HistoryRecord, JobResult, QueueItemView,
    StatusSnapshot, HISTORY_CAP, LOG_TAIL_CAP,
};
