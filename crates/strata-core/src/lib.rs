//! Strata Core - stack configuration, tags and deployment state
//!
//! This crate provides the engine behind a Strata workspace:
//! - Per-stack config with path-addressed keys and encrypted secrets
//! - Per-stack tags
//! - Versioned deployment snapshots and their import/export
//! - Stack lifecycle against a pluggable state backend
//!
//! Any surface (CLI, HTTP) drives it through [`WorkspaceManager`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐               ┌──────────────────────┐
//! │   Any surface     │ ─────────────→│   strata-core        │
//! │ (CLI, HTTP)       │               │   WorkspaceManager   │
//! │                   │ ←─────────────│                      │
//! └───────────────────┘    Result     └──────────┬───────────┘
//!                                                │
//!                     ┌──────────────┬───────────┼────────────┐
//!                     ▼              ▼           ▼            ▼
//!               ConfigStore      TagStore   StateCodec   StateBackend
//! ```

// Public API modules
pub mod error;
pub mod types;

// Workspace options
pub mod config;

// Settings documents on disk
pub mod settings;

// Stores
pub mod stack_config;
pub mod tags;

// Secrets encryption
pub mod secrets;

// Deployment snapshots
pub mod state;

// External boundaries
pub mod backend;
pub mod exec;

// Workspace management
pub mod workspace;

// Re-export commonly used types
pub use error::{Result, StrataError};
pub use types::{OutputMap, OutputValue, PluginInfo, StackName, StackSummary, WhoAmIResult};

// Re-export config types
pub use config::{load_options, BackendKind, WorkspaceOptions};

// Re-export store types
pub use stack_config::{ConfigMap, ConfigPath, ConfigStore, ConfigValue};
pub use tags::{TagMap, TagStore};

// Re-export state types
pub use state::{Deployment, StateCodec, CURRENT_VERSION, MIN_SUPPORTED_VERSION};

// Re-export boundary types
pub use backend::{EngineBackend, FileBackend, SharedBackend, StackRecord, StateBackend};
pub use exec::{
    CommandExecutor, CommandOptions, CommandOutput, CommandRequest, ProcessExecutor,
    SharedExecutor,
};
pub use secrets::{PassphraseSecretsProvider, SecretsConfig, SecretsProvider, SharedSecretsProvider};

// Re-export workspace types
pub use workspace::{
    CancelToken, RemoveOptions, UpdateContext, UpdateOutcome, UpdateSummary, WorkspaceManager,
};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
