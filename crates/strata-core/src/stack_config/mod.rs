//! Stack configuration
//!
//! Typed key/value configuration per stack with path-addressable nested
//! keys and secret markings.

mod path;
mod store;
mod value;

pub use path::{ConfigPath, PathSegment};
pub use store::ConfigStore;
pub use value::{ConfigMap, ConfigNode, ConfigValue, StackConfig, SECURE_KEY};
