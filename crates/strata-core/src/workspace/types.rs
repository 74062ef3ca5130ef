//! Workspace operation types

use crate::exec::CommandOptions;
use crate::stack_config::ConfigMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Options for removing a stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOptions {
    /// Remove even with unapplied config edits or recorded resources
    #[serde(default)]
    pub force: bool,

    /// Keep the stack settings file (config and tags)
    #[serde(default)]
    pub preserve_config: bool,
}

/// What an update operation sees
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub id: Uuid,
    pub stack: String,

    /// Working config at the start of the update, secrets in plaintext
    pub config: ConfigMap,

    /// Options for engine invocations made by the operation
    pub options: CommandOptions,
}

/// What an update operation produced
///
/// `None` leaves the snapshot's resources or outputs as they were.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    #[serde(default)]
    pub resources: Option<Vec<Value>>,
    #[serde(default)]
    pub outputs: Option<Map<String, Value>>,
}

/// Result of a completed update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub id: Uuid,
    pub stack: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub resource_count: usize,
}
