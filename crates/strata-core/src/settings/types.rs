//! Settings document types
//!
//! Project settings live in `Strata.toml` at the root of the work dir; each
//! stack has a `Strata.<stack>.toml` next to it. Both are serializable as
//! TOML or JSON.

use crate::secrets::SecretsConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Project-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project name; a workspace holds exactly one project
    pub name: String,

    /// Program runtime (e.g. "nodejs", "python")
    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Program entry point, relative to the work dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<PathBuf>,

    /// Backend override for this project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<ProjectBackend>,
}

fn default_runtime() -> String {
    "nodejs".to_string()
}

impl ProjectSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime: default_runtime(),
            description: None,
            main: None,
            backend: None,
        }
    }
}

/// Backend location declared by the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBackend {
    pub url: String,
}

/// Per-stack settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_salt: Option<String>,

    /// Program override for this stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<PathBuf>,

    /// Imported environments, merged in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Config in persisted form (secrets as `{"secure": ...}`)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

impl StackSettings {
    /// Secrets provider state, if the stack has one
    pub fn secrets_config(&self) -> Option<SecretsConfig> {
        self.secrets_provider.as_ref().map(|provider| SecretsConfig {
            provider: provider.clone(),
            salt: self.encryption_salt.clone(),
        })
    }

    pub fn set_secrets_config(&mut self, config: &SecretsConfig) {
        self.secrets_provider = Some(config.provider.clone());
        self.encryption_salt = config.salt.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_settings_toml_roundtrip() {
        let mut settings = StackSettings::default();
        settings.set_secrets_config(&SecretsConfig {
            provider: "passphrase".into(),
            salt: Some("c2FsdA==".into()),
        });
        settings.environments.push("shared/base".into());
        settings.tags.insert("team".into(), "infra".into());
        settings.config.insert(
            "app:db".into(),
            serde_json::json!({ "port": "5432", "password": { "secure": "v1:a:b" } }),
        );

        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: StackSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, settings);
        assert_eq!(parsed.secrets_config().unwrap().salt.as_deref(), Some("c2FsdA=="));
    }

    #[test]
    fn test_project_settings_defaults() {
        let parsed: ProjectSettings = toml::from_str("name = \"infra\"").unwrap();
        assert_eq!(parsed, ProjectSettings::new("infra"));
    }
}
