//! Well-known fields of a current-version snapshot body
//!
//! ```text
//! {
//!   "manifest": { "time": "...", "version": "..." },
//!   "secrets_providers": { "type": "passphrase", "state": { "salt": "..." } },
//!   "config": { "proj:key": "value", ... },
//!   "resources": [ ... ],
//!   "outputs": { ... }
//! }
//! ```

use super::codec::CURRENT_VERSION;
use super::deployment::Deployment;
use crate::secrets::SecretsConfig;
use crate::types::{OutputMap, OutputValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Snapshot manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
}

impl Deployment {
    /// Empty current-version snapshot for a new stack
    pub fn empty_snapshot(secrets: &SecretsConfig) -> Self {
        let mut deployment = Deployment::new(CURRENT_VERSION, Value::Object(Map::new()));
        deployment.stamp_manifest(Utc::now());
        deployment.set_secrets_config(secrets);
        deployment.set_config(Map::new());
        deployment.set_resources(Vec::new());
        deployment
    }

    pub fn manifest(&self) -> Option<SnapshotManifest> {
        self.body()
            .and_then(|body| body.get("manifest"))
            .and_then(|manifest| serde_json::from_value(manifest.clone()).ok())
    }

    /// Set `manifest.time`, keeping any other manifest fields
    pub fn stamp_manifest(&mut self, time: DateTime<Utc>) {
        let manifest = self
            .body_mut()
            .entry("manifest")
            .or_insert_with(|| Value::Object(Map::new()));
        if !manifest.is_object() {
            *manifest = Value::Object(Map::new());
        }
        if let Value::Object(map) = manifest {
            map.insert("time".to_string(), Value::String(time.to_rfc3339()));
            map.insert(
                "version".to_string(),
                Value::String(crate::version().to_string()),
            );
        }
    }

    /// Secrets provider state recorded in the body
    pub fn secrets_config(&self) -> Option<SecretsConfig> {
        let providers = self.body()?.get("secrets_providers")?.as_object()?;
        let provider = providers.get("type")?.as_str()?.to_string();
        let salt = providers
            .get("state")
            .and_then(|state| state.get("salt"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(SecretsConfig { provider, salt })
    }

    pub fn set_secrets_config(&mut self, secrets: &SecretsConfig) {
        self.body_mut().insert(
            "secrets_providers".to_string(),
            json!({ "type": secrets.provider, "state": { "salt": secrets.salt } }),
        );
    }

    /// Config in persisted form
    pub fn config(&self) -> Map<String, Value> {
        self.body()
            .and_then(|body| body.get("config"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_config(&mut self, config: Map<String, Value>) {
        self.body_mut()
            .insert("config".to_string(), Value::Object(config));
    }

    pub fn resources(&self) -> &[Value] {
        self.body()
            .and_then(|body| body.get("resources"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resource_count(&self) -> usize {
        self.resources().len()
    }

    pub fn set_resources(&mut self, resources: Vec<Value>) {
        self.body_mut()
            .insert("resources".to_string(), Value::Array(resources));
    }

    /// Stack outputs. Plain values map to `{value, secret: false}`; values
    /// wrapped as `{"secret": <value>}` are marked secret.
    pub fn outputs(&self) -> OutputMap {
        let Some(outputs) = self
            .body()
            .and_then(|body| body.get("outputs"))
            .and_then(Value::as_object)
        else {
            return OutputMap::new();
        };

        outputs
            .iter()
            .map(|(name, value)| {
                let output = match value {
                    Value::Object(map) if map.len() == 1 && map.contains_key("secret") => {
                        OutputValue {
                            value: map["secret"].clone(),
                            secret: true,
                        }
                    }
                    other => OutputValue {
                        value: other.clone(),
                        secret: false,
                    },
                };
                (name.clone(), output)
            })
            .collect()
    }

    pub fn set_outputs(&mut self, outputs: Map<String, Value>) {
        self.body_mut()
            .insert("outputs".to_string(), Value::Object(outputs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateCodec;
    use pretty_assertions::assert_eq;

    fn secrets() -> SecretsConfig {
        SecretsConfig {
            provider: "passphrase".into(),
            salt: Some("c2FsdA==".into()),
        }
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let snapshot = Deployment::empty_snapshot(&secrets());
        let bytes = StateCodec::encode(&snapshot).unwrap();
        let decoded = StateCodec::decode(&bytes).unwrap();

        assert_eq!(decoded.secrets_config(), Some(secrets()));
        assert_eq!(decoded.resource_count(), 0);
        assert!(decoded.config().is_empty());
        assert!(decoded.manifest().is_some());
    }

    #[test]
    fn test_outputs_secret_wrapper() {
        let mut snapshot = Deployment::empty_snapshot(&secrets());
        let mut outputs = Map::new();
        outputs.insert("url".into(), json!("https://example.test"));
        outputs.insert("token".into(), json!({ "secret": "abc" }));
        snapshot.set_outputs(outputs);

        let parsed = snapshot.outputs();
        assert!(!parsed["url"].secret);
        assert!(parsed["token"].secret);
        assert_eq!(parsed["token"].value, json!("abc"));
    }

    #[test]
    fn test_legacy_body_accessors() {
        let snapshot = Deployment::new(1, json!({ "resources": [{}, {}] }));
        assert_eq!(snapshot.resource_count(), 2);
        assert_eq!(snapshot.secrets_config(), None);
        assert_eq!(snapshot.manifest(), None);
    }
}
