//! Single-instance enforcement.
//!
//! The engine holds an exclusive advisory lock on a file recording its PID
//! before it touches any managed folder. A lock file whose recorded process
//! is no longer running is stale and gets replaced.

mod manager;

pub use manager::{is_process_alive, LockError, LockGuard, LockInfo, LockManager};
