//! Project and stack settings
//!
//! The on-disk source of truth for a workspace:
//!
//! ```text
//! <work_dir>/
//!     ├── Strata.toml            (project settings)
//!     ├── Strata.<stack>.toml    (per-stack settings: secrets, config, tags)
//!     └── .strata/workspace.json (local stack references, current stack)
//! ```

mod storage;
mod types;

pub use storage::SettingsStorage;
pub use types::{ProjectBackend, ProjectSettings, StackSettings};
