//! Pause/resume handle shared with the HTTP layer.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tracing::info;

/// Cloneable handle over the engine's pause flag.
///
/// Pausing only stops new jobs from being taken off the queue; a running
/// job always finishes.
#[derive(Debug, Clone)]
pub struct EngineControl {
    paused: Arc<watch::Sender<bool>>,
    wake: Arc<Notify>,
}

impl Default for EngineControl {
    fn default() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            wake: Arc::new(Notify::new()),
        }
    }
}

impl EngineControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop taking new jobs. Returns true if the flag changed.
    pub fn pause(&self) -> bool {
        let changed = self.set_paused(true);
        if changed {
            info!("Processing paused");
        }
        self.wake.notify_one();
        changed
    }

    /// Resume taking jobs. Returns true if the flag changed.
    pub fn resume(&self) -> bool {
        let changed = self.set_paused(false);
        if changed {
            info!("Processing resumed");
        }
        self.wake.notify_one();
        changed
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver that sees every change of the pause flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Wake the processing loop.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Wait for the next wake-up. A wake-up sent while nobody was waiting
    /// is delivered to the next caller.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    fn set_paused(&self, paused: bool) -> bool {
        self.paused.send_if_modified(|current| {
            if *current == paused {
                return false;
            }
            *current = paused;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_resume() {
        let control = EngineControl::new();
        assert!(!control.is_paused());

        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.is_paused());

        assert!(control.resume());
        assert!(!control.resume());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_clones_share_state() {
        let control = EngineControl::new();
        let handle = control.clone();
        handle.pause();
        assert!(control.is_paused());
    }

    #[tokio::test]
    async fn test_subscribers_see_flag_changes() {
        let control = EngineControl::new();
        let mut rx = control.subscribe();

        control.pause();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow_and_update());

        // Repeating the current state is not a change.
        control.pause();
        assert!(!rx.has_changed().unwrap());

        control.resume();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_resume_wakes_waiter() {
        let control = EngineControl::new();
        control.pause();
        // Consume the permit left by pause().
        control.notified().await;

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.notified().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.resume();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
