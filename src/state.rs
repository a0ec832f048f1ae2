//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::store::VersionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: VersionStore,
}

impl AppState {
    pub fn new(config: Config, store: VersionStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the version store
    pub fn store(&self) -> &VersionStore {
        &self.inner.store
    }
}
