use std::sync::Arc;

use ingest_core::{Config, EngineControl, StatusStore};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<StatusStore>,
    control: EngineControl,
}

impl AppState {
    pub fn new(config: Config, store: Arc<StatusStore>, control: EngineControl) -> Self {
        Self {
            config,
            store,
            control,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StatusStore {
        self.store.as_ref()
    }

    pub fn control(&self) -> &EngineControl {
        &self.control
    }
}
