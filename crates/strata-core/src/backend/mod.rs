//! State backends
//!
//! A [`StateBackend`] is the authoritative list of stacks and the store for
//! their snapshots. The workspace picks one adapter at construction time.

mod engine;
mod file;

pub use engine::EngineBackend;
pub use file::FileBackend;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stack as the backend sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_in_progress: bool,
    #[serde(default)]
    pub resource_count: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Stack list and snapshot storage
pub trait StateBackend: Send + Sync {
    /// Short name for logs ("file", "engine")
    fn kind(&self) -> &'static str;

    /// Stacks of one project, or of every project when `None`
    fn list_stacks(&self, project: Option<&str>) -> Result<Vec<StackRecord>>;

    fn stack_exists(&self, project: &str, stack: &str) -> Result<bool>;

    /// Create a stack holding `initial` as its first snapshot
    fn create_stack(&self, project: &str, stack: &str, initial: &[u8]) -> Result<()>;

    fn remove_stack(&self, project: &str, stack: &str) -> Result<()>;

    /// Stored snapshot document
    fn load_snapshot(&self, project: &str, stack: &str) -> Result<Vec<u8>>;

    fn save_snapshot(&self, project: &str, stack: &str, document: &[u8]) -> Result<()>;
}

/// Thread-safe shared backend
pub type SharedBackend = Arc<dyn StateBackend>;
