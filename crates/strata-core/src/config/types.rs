//! Option types for `.strata.toml`

use crate::exec::CommandOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Everything needed to open a workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceOptions {
    /// Project root; set by the caller, never read from the file
    #[serde(skip)]
    pub work_dir: PathBuf,

    /// Engine home directory (`STRATA_HOME`)
    #[serde(default)]
    pub home: Option<PathBuf>,

    /// Project name used when the work dir has no `Strata.toml` yet
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub secrets: SecretsOptions,
}

impl WorkspaceOptions {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.secrets.passphrase = Some(passphrase.into());
        self
    }

    /// Engine home: explicit `home`, else `~/.strata`, else `<work_dir>/.strata`
    pub fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .or_else(|| dirs::home_dir().map(|d| d.join(".strata")))
            .unwrap_or_else(|| self.work_dir.join(".strata"))
    }

    /// Root directory of the file backend
    pub fn file_backend_root(&self) -> PathBuf {
        match &self.backend.url {
            Some(url) => PathBuf::from(url.strip_prefix("file://").unwrap_or(url)),
            None => self.home_dir().join("stacks"),
        }
    }

    /// Options for every engine invocation
    pub fn command_options(&self) -> CommandOptions {
        CommandOptions {
            work_dir: self.work_dir.clone(),
            env: self.engine.env.clone(),
            home: self.home.clone(),
        }
    }
}

/// Which [`StateBackend`](crate::backend::StateBackend) to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    File,
    Engine,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// `file://` URL or path for the file backend
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine binary name or path
    #[serde(default = "default_engine_binary")]
    pub binary: String,

    /// Extra env vars passed to every engine call
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_engine_binary() -> String {
    "strata-engine".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecretsOptions {
    /// Secrets provider id
    #[serde(default = "default_secrets_provider")]
    pub provider: String,

    #[serde(default)]
    pub passphrase: Option<String>,

    /// PBKDF2 iteration override
    #[serde(default)]
    pub iterations: Option<u32>,
}

fn default_secrets_provider() -> String {
    "passphrase".to_string()
}

impl Default for SecretsOptions {
    fn default() -> Self {
        Self {
            provider: default_secrets_provider(),
            passphrase: None,
            iterations: None,
        }
    }
}

impl fmt::Debug for SecretsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsOptions")
            .field("provider", &self.provider)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[redacted]"))
            .field("iterations", &self.iterations)
            .finish()
    }
}
