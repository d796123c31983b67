//! Watch-folder polling and stabilization detection.
//!
//! Files copied off a camera card arrive over seconds or minutes. The
//! watcher samples their sizes on every poll and only admits a file once
//! its size has settled and it has been around long enough.

mod poller;
mod stabilizer;

pub use poller::{AdmittedFile, FileWatcher};
pub use stabilizer::{CandidateFile, Observation, SizeSample, StabilizationDetector};
