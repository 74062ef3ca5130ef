//! Per-stack tags
//!
//! Flat string key/value pairs kept in the stack settings file.

use crate::error::{Result, StrataError};
use crate::settings::SettingsStorage;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Tag key -> value
pub type TagMap = BTreeMap<String, String>;

/// Tags for every attached stack
pub struct TagStore {
    storage: Arc<SettingsStorage>,
    stacks: RwLock<HashMap<String, TagMap>>,
}

impl TagStore {
    pub fn new(storage: Arc<SettingsStorage>) -> Self {
        Self {
            storage,
            stacks: RwLock::new(HashMap::new()),
        }
    }

    /// Load a stack's tags from its settings file
    pub fn attach(&self, stack: &str) -> Result<()> {
        let tags = self.storage.load_stack(stack)?.tags;
        self.stacks.write().insert(stack.to_string(), tags);
        Ok(())
    }

    pub fn detach(&self, stack: &str) {
        self.stacks.write().remove(stack);
    }

    pub fn is_attached(&self, stack: &str) -> bool {
        self.stacks.read().contains_key(stack)
    }

    pub fn get(&self, stack: &str, key: &str) -> Result<String> {
        let stacks = self.stacks.read();
        let tags = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        tags.get(key)
            .cloned()
            .ok_or_else(|| StrataError::not_found(format!("tag '{}' on stack '{}'", key, stack)))
    }

    pub fn list(&self, stack: &str) -> Result<TagMap> {
        let stacks = self.stacks.read();
        stacks
            .get(stack)
            .cloned()
            .ok_or_else(|| not_attached(stack))
    }

    /// Set a tag, overwriting any existing value
    pub fn set(&self, stack: &str, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(StrataError::config("tag keys must not be empty"));
        }
        self.mutate(stack, |tags| {
            tags.insert(key.to_string(), value.to_string());
        })?;
        tracing::debug!(stack, key, "tag set");
        Ok(())
    }

    /// Remove a tag; a missing key is a no-op
    pub fn remove(&self, stack: &str, key: &str) -> Result<()> {
        self.mutate(stack, |tags| {
            tags.remove(key);
        })
    }

    fn mutate<F>(&self, stack: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut TagMap),
    {
        let current = self.list(stack)?;
        let mut candidate = current.clone();
        f(&mut candidate);
        if candidate == current {
            return Ok(());
        }

        let mut settings = self.storage.load_stack(stack)?;
        settings.tags = candidate.clone();
        self.storage.save_stack(stack, &settings)?;

        self.stacks.write().insert(stack.to_string(), candidate);
        Ok(())
    }
}

fn not_attached(stack: &str) -> StrataError {
    StrataError::not_found(format!("stack '{}'", stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_store() -> (TagStore, Arc<SettingsStorage>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(SettingsStorage::new(dir.path()));
        let store = TagStore::new(storage.clone());
        store.attach("dev").unwrap();
        (store, storage, dir)
    }

    #[test]
    fn test_set_get_overwrite() {
        let (store, storage, _dir) = test_store();
        store.set("dev", "owner", "alice").unwrap();
        store.set("dev", "owner", "bob").unwrap();

        assert_eq!(store.get("dev", "owner").unwrap(), "bob");
        assert_eq!(storage.load_stack("dev").unwrap().tags["owner"], "bob");
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let (store, _, _dir) = test_store();
        store.set("dev", "Team", "a").unwrap();
        store.set("dev", "team", "b").unwrap();
        assert_eq!(store.list("dev").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_tag() {
        let (store, _, _dir) = test_store();
        assert!(store.get("dev", "nope").unwrap_err().is_not_found());
        store.remove("dev", "nope").unwrap();
        assert!(store.list("dev").unwrap().is_empty());
    }

    #[test]
    fn test_reattach_reads_settings() {
        let (store, storage, _dir) = test_store();
        store.set("dev", "tier", "gold").unwrap();
        store.remove("dev", "tier").unwrap();
        store.set("dev", "env", "dev").unwrap();

        let reloaded = TagStore::new(storage);
        reloaded.attach("dev").unwrap();
        assert_eq!(reloaded.list("dev").unwrap(), store.list("dev").unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        let (store, _, _dir) = test_store();
        assert!(store.set("dev", "", "v").is_err());
    }
}
