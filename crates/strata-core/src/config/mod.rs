//! Workspace options
//!
//! Handles loading of `.strata.toml` with environment variable expansion
//! and `STRATA_*` overrides.

mod loader;
mod types;

pub use loader::{load_options, sample_config, ConfigError};
pub use types::{BackendConfig, BackendKind, EngineConfig, SecretsOptions, WorkspaceOptions};
