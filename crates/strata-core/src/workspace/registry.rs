//! Local stack references and the current-stack pointer
//!
//! Stored at `<work_dir>/.strata/workspace.json`. This is the project's
//! local view; the backend may know stacks this file does not, and the
//! other way round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A locally known stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRef {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_selected: Option<DateTime<Utc>>,
}

impl StackRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            last_selected: None,
        }
    }

    /// Mark as selected now
    pub fn touch(&mut self) {
        self.last_selected = Some(Utc::now());
    }
}

/// Registry of local stack references
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackRegistry {
    #[serde(default)]
    pub stacks: BTreeMap<String, StackRef>,

    /// Currently selected stack
    #[serde(default)]
    pub current: Option<String>,

    /// Recently selected stacks (most recent first)
    #[serde(default)]
    pub recent: Vec<String>,
}

impl StackRegistry {
    /// Maximum number of recent stacks to track
    const MAX_RECENT: usize = 20;

    /// Add a reference if not yet known
    pub fn add(&mut self, name: &str) {
        self.stacks
            .entry(name.to_string())
            .or_insert_with(|| StackRef::new(name));
    }

    /// Remove a reference, clearing the current pointer if it pointed here
    pub fn remove(&mut self, name: &str) -> Option<StackRef> {
        self.recent.retain(|r| r != name);
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        self.stacks.remove(name)
    }

    /// Set the current stack, adding a reference for it
    pub fn select(&mut self, name: &str) {
        self.add(name);
        if let Some(stack) = self.stacks.get_mut(name) {
            stack.touch();
        }
        self.recent.retain(|r| r != name);
        self.recent.insert(0, name.to_string());
        self.recent.truncate(Self::MAX_RECENT);
        self.current = Some(name.to_string());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_and_remove() {
        let mut registry = StackRegistry::default();
        registry.add("dev");
        registry.select("prod");
        registry.select("dev");

        assert_eq!(registry.current.as_deref(), Some("dev"));
        assert_eq!(registry.recent, vec!["dev", "prod"]);
        assert!(registry.stacks["dev"].last_selected.is_some());

        registry.remove("dev");
        assert!(registry.current.is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["prod"]);
    }

    #[test]
    fn test_add_keeps_existing_reference() {
        let mut registry = StackRegistry::default();
        registry.select("dev");
        let before = registry.stacks["dev"].clone();
        registry.add("dev");
        assert_eq!(registry.stacks["dev"], before);
    }
}
