//! Workspace management module
//!
//! A workspace is one project in one work dir, with any number of stacks.
//!
//! # Architecture
//!
//! ```text
//! WorkspaceManager
//!     │
//!     ├── StackRegistry (persistent)
//!     │   └── <work_dir>/.strata/workspace.json
//!     │
//!     ├── SettingsStorage (disk I/O)
//!     │   ├── <work_dir>/Strata.toml (project)
//!     │   └── <work_dir>/Strata.<stack>.toml (config, tags, secrets salt)
//!     │
//!     ├── ConfigStore / TagStore (per-stack, loaded on first use)
//!     │
//!     ├── StateBackend (stack list + snapshots)
//!     │   ├── FileBackend
//!     │   └── EngineBackend ── CommandExecutor
//!     │
//!     └── StackLocks (per-stack mutex + Updating marker)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{ConfigValue, WorkspaceManager, WorkspaceOptions};
//!
//! let options = WorkspaceOptions::new("/path/to/project").with_project("infra");
//! let manager = WorkspaceManager::open(options)?;
//!
//! manager.create_stack("dev")?;
//! manager.set_config("dev", "region", ConfigValue::new("us-west-2"), false)?;
//!
//! let state = manager.export_stack("dev")?;
//! manager.create_stack("dev2")?;
//! manager.import_stack("dev2", &state)?;
//! ```

mod locks;
mod manager;
mod registry;
mod types;

pub use locks::{CancelToken, StackLocks, UpdateGuard};
pub use manager::WorkspaceManager;
pub use registry::{StackRef, StackRegistry};
pub use types::{RemoveOptions, UpdateContext, UpdateOutcome, UpdateSummary};
