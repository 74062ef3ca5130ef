//! Config values and the per-stack config tree
//!
//! In memory a stack's config is a map of top-level keys to [`ConfigNode`]
//! trees whose leaves are [`ConfigValue`]s. Secret leaves hold plaintext
//! here and only here; the persisted form (see [`StackConfig::to_persisted`])
//! carries ciphertext under a `secure` marker.

use super::path::{ConfigPath, PathSegment};
use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Marker key for encrypted leaves in the persisted form
pub const SECURE_KEY: &str = "secure";

/// A single configuration value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl ConfigValue {
    /// A plain (non-secret) value
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    /// A value to be encrypted at rest
    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: &str = if self.secret { "[secret]" } else { &self.value };
        f.debug_struct("ConfigValue")
            .field("value", &shown)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Flat view of a stack's config: full key -> value
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A node in a config tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNode {
    Value(ConfigValue),
    Map(BTreeMap<String, ConfigNode>),
    List(Vec<ConfigNode>),
}

impl ConfigNode {
    /// Whether any leaf under this node is secret
    pub fn is_secret(&self) -> bool {
        match self {
            ConfigNode::Value(v) => v.secret,
            ConfigNode::Map(map) => map.values().any(ConfigNode::is_secret),
            ConfigNode::List(list) => list.iter().any(ConfigNode::is_secret),
        }
    }

    /// Collapse to a single value; structured nodes become their JSON text
    pub fn to_config_value(&self) -> ConfigValue {
        match self {
            ConfigNode::Value(v) => v.clone(),
            other => ConfigValue {
                value: other.to_plain_json().to_string(),
                secret: other.is_secret(),
            },
        }
    }

    fn to_plain_json(&self) -> Value {
        match self {
            ConfigNode::Value(v) => Value::String(v.value.clone()),
            ConfigNode::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, node)| (k.clone(), node.to_plain_json()))
                    .collect(),
            ),
            ConfigNode::List(list) => {
                Value::Array(list.iter().map(ConfigNode::to_plain_json).collect())
            }
        }
    }

    fn get(&self, segments: &[PathSegment]) -> Option<&ConfigNode> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        let child = match (self, first) {
            (ConfigNode::Map(map), PathSegment::Key(key)) => map.get(key)?,
            (ConfigNode::List(list), PathSegment::Index(index)) => list.get(*index)?,
            _ => return None,
        };
        child.get(rest)
    }

    /// Set a value below this node, creating containers along the way.
    /// Errors carry the reason only; the caller adds the path.
    fn set(&mut self, segments: &[PathSegment], value: ConfigValue) -> std::result::Result<(), String> {
        let Some((first, rest)) = segments.split_first() else {
            *self = ConfigNode::Value(value);
            return Ok(());
        };

        let child = match (self, first) {
            (ConfigNode::Map(_), PathSegment::Key(key)) if key == SECURE_KEY => {
                return Err(format!("'{}' is a reserved key", SECURE_KEY))
            }
            (ConfigNode::Map(map), PathSegment::Key(key)) => map
                .entry(key.clone())
                .or_insert_with(|| empty_container_for(rest)),
            (ConfigNode::List(list), PathSegment::Index(index)) => {
                if *index == list.len() {
                    list.push(empty_container_for(rest));
                }
                let len = list.len();
                list.get_mut(*index)
                    .ok_or_else(|| format!("index {} out of range for list of length {}", index, len))?
            }
            (ConfigNode::Map(_), PathSegment::Index(index)) => {
                return Err(format!("cannot index [{}] into a map", index))
            }
            (ConfigNode::List(_), PathSegment::Key(key)) => {
                return Err(format!("cannot select key '{}' on a list", key))
            }
            (ConfigNode::Value(_), segment) => {
                return Err(format!("cannot address '{}' inside a scalar value", segment))
            }
        };
        child.set(rest, value)
    }

    /// Remove the node at `segments`. Returns false if nothing was there.
    fn remove(&mut self, segments: &[PathSegment]) -> bool {
        let Some((first, rest)) = segments.split_first() else {
            return false;
        };
        if rest.is_empty() {
            return match (self, first) {
                (ConfigNode::Map(map), PathSegment::Key(key)) => map.remove(key).is_some(),
                (ConfigNode::List(list), PathSegment::Index(index)) if *index < list.len() => {
                    list.remove(*index);
                    true
                }
                _ => false,
            };
        }
        let child = match (self, first) {
            (ConfigNode::Map(map), PathSegment::Key(key)) => map.get_mut(key),
            (ConfigNode::List(list), PathSegment::Index(index)) => list.get_mut(*index),
            _ => None,
        };
        child.map_or(false, |c| c.remove(rest))
    }
}

fn empty_container_for(rest: &[PathSegment]) -> ConfigNode {
    match rest.first() {
        Some(PathSegment::Index(_)) => ConfigNode::List(Vec::new()),
        Some(PathSegment::Key(_)) => ConfigNode::Map(BTreeMap::new()),
        None => ConfigNode::Value(ConfigValue::new("")),
    }
}

/// All config for one stack, keyed by full `namespace:name` key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackConfig {
    entries: BTreeMap<String, ConfigNode>,
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up the node a path points at
    pub fn get(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        self.entries.get(path.root())?.get(path.rest())
    }

    /// Set the value a path points at
    pub fn set(&mut self, path: &ConfigPath, value: ConfigValue) -> Result<()> {
        let root = path.root().to_string();
        let rest = path.rest();
        let result = match self.entries.get_mut(&root) {
            Some(node) => node.set(rest, value),
            None => {
                let mut node = empty_container_for(rest);
                let result = node.set(rest, value);
                if result.is_ok() {
                    self.entries.insert(root, node);
                }
                result
            }
        };
        result.map_err(|reason| StrataError::invalid_path(path.to_string(), reason))
    }

    /// Remove the value a path points at. Absent paths are a no-op.
    pub fn remove(&mut self, path: &ConfigPath) -> bool {
        if path.rest().is_empty() {
            return self.entries.remove(path.root()).is_some();
        }
        self.entries
            .get_mut(path.root())
            .map_or(false, |node| node.remove(path.rest()))
    }

    /// Flatten to a [`ConfigMap`]
    pub fn to_map(&self) -> ConfigMap {
        self.entries
            .iter()
            .map(|(key, node)| (key.clone(), node.to_config_value()))
            .collect()
    }

    /// Persisted form: plain leaves as strings, secret leaves as
    /// `{"secure": <ciphertext>}`.
    pub fn to_persisted<F>(&self, mut encrypt: F) -> Result<Map<String, Value>>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut out = Map::new();
        for (key, node) in &self.entries {
            out.insert(key.clone(), persist_node(node, &mut encrypt)?);
        }
        Ok(out)
    }

    /// Rebuild from the persisted form, decrypting secure leaves
    pub fn from_persisted<F>(persisted: &Map<String, Value>, mut decrypt: F) -> Result<Self>
    where
        F: FnMut(&str, &str) -> Result<String>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in persisted {
            entries.insert(key.clone(), restore_node(key, value, &mut decrypt)?);
        }
        Ok(Self { entries })
    }
}

fn persist_node<F>(node: &ConfigNode, encrypt: &mut F) -> Result<Value>
where
    F: FnMut(&str) -> Result<String>,
{
    Ok(match node {
        ConfigNode::Value(v) if v.secret => {
            let mut secure = Map::new();
            secure.insert(SECURE_KEY.to_string(), Value::String(encrypt(&v.value)?));
            Value::Object(secure)
        }
        ConfigNode::Value(v) => Value::String(v.value.clone()),
        ConfigNode::Map(map) => {
            let mut out = Map::new();
            for (k, child) in map {
                out.insert(k.clone(), persist_node(child, encrypt)?);
            }
            Value::Object(out)
        }
        ConfigNode::List(list) => Value::Array(
            list.iter()
                .map(|child| persist_node(child, encrypt))
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

fn restore_node<F>(key: &str, value: &Value, decrypt: &mut F) -> Result<ConfigNode>
where
    F: FnMut(&str, &str) -> Result<String>,
{
    Ok(match value {
        Value::String(s) => ConfigNode::Value(ConfigValue::new(s.clone())),
        Value::Bool(b) => ConfigNode::Value(ConfigValue::new(b.to_string())),
        Value::Number(n) => ConfigNode::Value(ConfigValue::new(n.to_string())),
        Value::Object(map) if map.len() == 1 && map.contains_key(SECURE_KEY) => {
            match map.get(SECURE_KEY) {
                Some(Value::String(ciphertext)) => {
                    ConfigNode::Value(ConfigValue::secret(decrypt(key, ciphertext)?))
                }
                _ => {
                    return Err(StrataError::config(format!(
                        "config key '{}' has a non-string secure value",
                        key
                    )))
                }
            }
        }
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, child) in map {
                out.insert(k.clone(), restore_node(key, child, decrypt)?);
            }
            ConfigNode::Map(out)
        }
        Value::Array(items) => ConfigNode::List(
            items
                .iter()
                .map(|child| restore_node(key, child, decrypt))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Null => {
            return Err(StrataError::config(format!(
                "config key '{}' has a null value",
                key
            )))
        }
    })
}
