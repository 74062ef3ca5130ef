//! ConfigStore - per-stack configuration with all-or-nothing mutations
//!
//! Each attached stack has a working config (what the user has set) and an
//! applied config (what the last update or import recorded). Mutations are
//! computed on a copy, persisted to the stack settings file, and only then
//! swapped in, so a failed batch leaves nothing behind.

use super::path::ConfigPath;
use super::value::{ConfigMap, ConfigValue, StackConfig};
use crate::error::{Result, StrataError};
use crate::secrets::{SecretsConfig, SharedSecretsProvider};
use crate::settings::SettingsStorage;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Config state for one attached stack
#[derive(Clone)]
struct StackEntry {
    working: StackConfig,
    applied: StackConfig,
    secrets: SecretsConfig,

    /// plaintext -> ciphertext, so unchanged secrets persist identically
    ciphertexts: HashMap<String, String>,
}

/// Typed key/value configuration for every stack of a project
pub struct ConfigStore {
    /// Namespace for keys given without one
    project: String,

    storage: Arc<SettingsStorage>,

    secrets: SharedSecretsProvider,

    stacks: RwLock<HashMap<String, StackEntry>>,
}

impl ConfigStore {
    pub fn new(
        project: impl Into<String>,
        storage: Arc<SettingsStorage>,
        secrets: SharedSecretsProvider,
    ) -> Self {
        Self {
            project: project.into(),
            storage,
            secrets,
            stacks: RwLock::new(HashMap::new()),
        }
    }

    // ========== Attachment ==========

    /// Load a stack's working config from its settings file.
    ///
    /// `applied` is the config recorded in the stack's last snapshot.
    pub fn attach(&self, stack: &str, secrets: SecretsConfig, applied: StackConfig) -> Result<()> {
        let settings = self.storage.load_stack(stack)?;
        let mut ciphertexts = HashMap::new();
        let working = StackConfig::from_persisted(&settings.config, |key, ciphertext| {
            let plain = self
                .secrets
                .decrypt(ciphertext, &secrets)
                .map_err(|e| StrataError::decrypt_failed(key, e))?;
            ciphertexts.insert(plain.clone(), ciphertext.to_string());
            Ok(plain)
        })?;

        tracing::debug!(stack, keys = working.len(), "attached stack config");
        self.stacks.write().insert(
            stack.to_string(),
            StackEntry {
                working,
                applied,
                secrets,
                ciphertexts,
            },
        );
        Ok(())
    }

    /// Drop a stack's in-memory config
    pub fn detach(&self, stack: &str) {
        self.stacks.write().remove(stack);
    }

    pub fn is_attached(&self, stack: &str) -> bool {
        self.stacks.read().contains_key(stack)
    }

    /// Decrypt a persisted config map under the given provider state
    pub fn decode(&self, persisted: &Map<String, Value>, secrets: &SecretsConfig) -> Result<StackConfig> {
        StackConfig::from_persisted(persisted, |key, ciphertext| {
            self.secrets
                .decrypt(ciphertext, secrets)
                .map_err(|e| StrataError::decrypt_failed(key, e))
        })
    }

    // ========== Reads ==========

    /// Get a single value
    pub fn get(&self, stack: &str, key: &str, path: bool) -> Result<ConfigValue> {
        let config_path = self.resolve(key, path)?;
        let stacks = self.stacks.read();
        let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        entry
            .working
            .get(&config_path)
            .map(|node| node.to_config_value())
            .ok_or_else(|| {
                StrataError::not_found(format!(
                    "config key '{}' in stack '{}'",
                    config_path, stack
                ))
            })
    }

    /// Get all values as a flat map
    pub fn get_all(&self, stack: &str) -> Result<ConfigMap> {
        let stacks = self.stacks.read();
        let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        Ok(entry.working.to_map())
    }

    /// Whether the working config differs from the last applied config
    pub fn is_dirty(&self, stack: &str) -> Result<bool> {
        let stacks = self.stacks.read();
        let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        Ok(entry.working != entry.applied)
    }

    pub fn secrets_config(&self, stack: &str) -> Result<SecretsConfig> {
        let stacks = self.stacks.read();
        let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        Ok(entry.secrets.clone())
    }

    /// Working config in persisted (encrypted) form
    pub fn persisted(&self, stack: &str) -> Result<Map<String, Value>> {
        let (working, secrets, mut ciphertexts) = {
            let stacks = self.stacks.read();
            let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
            (entry.working.clone(), entry.secrets.clone(), entry.ciphertexts.clone())
        };
        let persisted = self.encrypt_all(&working, &secrets, &mut ciphertexts)?;
        if let Some(entry) = self.stacks.write().get_mut(stack) {
            entry.ciphertexts = ciphertexts;
        }
        Ok(persisted)
    }

    /// Current working and applied configs (for rollback)
    pub fn checkpoint(&self, stack: &str) -> Result<(StackConfig, StackConfig)> {
        let stacks = self.stacks.read();
        let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
        Ok((entry.working.clone(), entry.applied.clone()))
    }

    // ========== Mutations ==========

    /// Set a single value
    pub fn set(&self, stack: &str, key: &str, value: ConfigValue, path: bool) -> Result<()> {
        let config_path = self.resolve(key, path)?;
        self.mutate(stack, |config, _| config.set(&config_path, value))?;
        tracing::debug!(stack, key = %config_path, "config set");
        Ok(())
    }

    /// Set every entry of `values`, or none of them
    pub fn set_all(&self, stack: &str, values: &ConfigMap, path: bool) -> Result<()> {
        let resolved = values
            .iter()
            .map(|(key, value)| Ok((self.resolve(key, path)?, value.clone())))
            .collect::<Result<Vec<_>>>()?;

        self.mutate(stack, |config, _| {
            for (config_path, value) in resolved {
                config.set(&config_path, value)?;
            }
            Ok(())
        })?;
        tracing::debug!(stack, count = values.len(), "config set all");
        Ok(())
    }

    /// Remove a value; absent keys are a no-op
    pub fn remove(&self, stack: &str, key: &str, path: bool) -> Result<()> {
        let config_path = self.resolve(key, path)?;
        let changed = self.mutate(stack, |config, _| {
            config.remove(&config_path);
            Ok(())
        })?;
        tracing::debug!(stack, key = %config_path, changed, "config remove");
        Ok(())
    }

    /// Remove every key in `keys`, or none of them
    pub fn remove_all(&self, stack: &str, keys: &[String], path: bool) -> Result<()> {
        let resolved = keys
            .iter()
            .map(|key| self.resolve(key, path))
            .collect::<Result<Vec<_>>>()?;

        self.mutate(stack, |config, _| {
            for config_path in &resolved {
                config.remove(config_path);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Discard local edits: working config becomes the last applied config
    pub fn refresh(&self, stack: &str) -> Result<()> {
        let changed = self.mutate(stack, |config, applied| {
            *config = applied.clone();
            Ok(())
        })?;
        tracing::info!(stack, changed, "config refreshed from last applied state");
        Ok(())
    }

    /// Record the working config as applied
    pub fn mark_applied(&self, stack: &str) -> Result<()> {
        let mut stacks = self.stacks.write();
        let entry = stacks.get_mut(stack).ok_or_else(|| not_attached(stack))?;
        entry.applied = entry.working.clone();
        Ok(())
    }

    /// Replace both working and applied config (import) and persist
    pub fn replace(&self, stack: &str, config: StackConfig) -> Result<()> {
        self.restore(stack, config.clone(), config)
    }

    /// Restore working and applied config and persist the working half
    pub fn restore(&self, stack: &str, working: StackConfig, applied: StackConfig) -> Result<()> {
        let (secrets, mut ciphertexts) = {
            let stacks = self.stacks.read();
            let entry = stacks.get(stack).ok_or_else(|| not_attached(stack))?;
            (entry.secrets.clone(), entry.ciphertexts.clone())
        };
        self.persist(stack, &working, &secrets, &mut ciphertexts)?;

        let mut stacks = self.stacks.write();
        let entry = stacks.get_mut(stack).ok_or_else(|| not_attached(stack))?;
        entry.working = working;
        entry.applied = applied;
        entry.ciphertexts = ciphertexts;
        Ok(())
    }

    /// Apply `f` to a copy of the working config, persist, then swap in.
    /// Returns whether anything changed.
    fn mutate<F>(&self, stack: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut StackConfig, &StackConfig) -> Result<()>,
    {
        let mut entry = {
            let stacks = self.stacks.read();
            stacks.get(stack).ok_or_else(|| not_attached(stack))?.clone()
        };

        let mut candidate = entry.working.clone();
        f(&mut candidate, &entry.applied)?;
        if candidate == entry.working {
            return Ok(false);
        }

        self.persist(stack, &candidate, &entry.secrets, &mut entry.ciphertexts)?;

        let mut stacks = self.stacks.write();
        if let Some(current) = stacks.get_mut(stack) {
            current.working = candidate;
            current.ciphertexts = entry.ciphertexts;
        }
        Ok(true)
    }

    // ========== Helpers ==========

    /// Turn a user key into a config path with a namespaced root
    fn resolve(&self, key: &str, path: bool) -> Result<ConfigPath> {
        if path {
            let parsed = ConfigPath::parse(key)?;
            let root = self.namespaced(parsed.root(), key)?;
            Ok(parsed.with_root(root))
        } else {
            Ok(ConfigPath::literal(self.namespaced(key, key)?))
        }
    }

    fn namespaced(&self, key: &str, original: &str) -> Result<String> {
        match key.split_once(':') {
            None if key.is_empty() => Err(StrataError::invalid_path(original, "empty config key")),
            None => Ok(format!("{}:{}", self.project, key)),
            Some((namespace, name)) => {
                if namespace.is_empty() || name.is_empty() || name.contains(':') {
                    return Err(StrataError::invalid_path(
                        original,
                        "config keys must have the form 'namespace:name'",
                    ));
                }
                Ok(key.to_string())
            }
        }
    }

    fn encrypt_all(
        &self,
        config: &StackConfig,
        secrets: &SecretsConfig,
        ciphertexts: &mut HashMap<String, String>,
    ) -> Result<Map<String, Value>> {
        config.to_persisted(|plain| {
            if let Some(ciphertext) = ciphertexts.get(plain) {
                return Ok(ciphertext.clone());
            }
            let ciphertext = self.secrets.encrypt(plain, secrets)?;
            ciphertexts.insert(plain.to_string(), ciphertext.clone());
            Ok(ciphertext)
        })
    }

    /// Write a config into the stack settings file
    fn persist(
        &self,
        stack: &str,
        config: &StackConfig,
        secrets: &SecretsConfig,
        ciphertexts: &mut HashMap<String, String>,
    ) -> Result<()> {
        let persisted = self.encrypt_all(config, secrets, ciphertexts)?;
        let mut settings = self.storage.load_stack(stack)?;
        settings.config = persisted;
        settings.set_secrets_config(secrets);
        self.storage.save_stack(stack, &settings)
    }
}

fn not_attached(stack: &str) -> StrataError {
    StrataError::not_found(format!("stack '{}'", stack))
}
