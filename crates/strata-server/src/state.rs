//! Server state management

use std::sync::Arc;
use strata_core::{Result, WorkspaceManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<WorkspaceManager>,
}

impl AppState {
    pub fn new(manager: WorkspaceManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Run a workspace call off the async runtime
    ///
    /// Manager calls touch the filesystem and may shell out to the engine.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&WorkspaceManager) -> Result<T> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        match tokio::task::spawn_blocking(move || f(&manager)).await {
            Ok(result) => result,
            Err(e) => Err(strata_core::StrataError::config(format!(
                "workspace task failed: {}",
                e
            ))),
        }
    }
}
