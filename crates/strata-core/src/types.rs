//! Shared types for the public API
//!
//! Stack names, stack summaries and the read-only descriptions the engine
//! reports (identity, plugins, outputs). Everything here is serializable for
//! the HTTP surface.

use crate::error::{Result, StrataError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn stack_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,100}$").expect("valid stack name pattern"))
}

/// Validated stack name, unique within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackName(String);

impl StackName {
    /// Validate and wrap a stack name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !stack_name_pattern().is_match(&name) || name == "." || name == ".." {
            return Err(StrataError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StackName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StackName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StackName {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<StackName> for String {
    fn from(name: StackName) -> Self {
        name.0
    }
}

/// Summary of the status of a stack
///
/// Derived on every call from the registry and backend; never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub name: String,
    pub current: bool,
    #[serde(default)]
    pub update_in_progress: Option<bool>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource_count: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// The identity the engine is logged in as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoAmIResult {
    pub user: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub organizations: Option<Vec<String>>,
}

/// An installed engine plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_used_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub install_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A single stack output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub secret: bool,
}

/// Stack outputs by name
pub type OutputMap = BTreeMap<String, OutputValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_validation() {
        assert!(StackName::new("dev").is_ok());
        assert!(StackName::new("prod-us_west.2").is_ok());
        assert!(matches!(
            StackName::new(""),
            Err(StrataError::InvalidName(_))
        ));
        assert!(StackName::new("org/dev").is_err());
        assert!(StackName::new("..").is_err());
        assert!(StackName::new("a".repeat(101)).is_err());
    }

    #[test]
    fn test_stack_name_serde() {
        let name: StackName = serde_json::from_str("\"staging\"").unwrap();
        assert_eq!(name.as_str(), "staging");
        assert!(serde_json::from_str::<StackName>("\"bad name\"").is_err());
    }

    #[test]
    fn test_plugin_info_from_engine_json() {
        let json = r#"{"name":"aws","kind":"resource","size":1024,"version":"6.0.0"}"#;
        let plugin: PluginInfo = serde_json::from_str(json).unwrap();
        assert_eq!(plugin.name, "aws");
        assert_eq!(plugin.version.as_deref(), Some("6.0.0"));
        assert!(plugin.install_time.is_none());
    }
}
