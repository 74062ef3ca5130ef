//! Options loader with environment variable expansion
//!
//! Loads options from `.strata.toml` in the work dir or the user config
//! directory.

use super::types::{BackendKind, WorkspaceOptions};
use crate::error::StrataError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Options loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl From<ConfigError> for StrataError {
    fn from(err: ConfigError) -> Self {
        StrataError::config(err.to_string())
    }
}

/// Load options for a work dir
///
/// Priority order:
/// 1. Project-level `.strata.toml`
/// 2. User-level `~/.config/strata/config.toml`
/// 3. Defaults
///
/// `STRATA_*` environment variables override all three.
pub fn load_options(work_dir: &Path) -> Result<WorkspaceOptions, ConfigError> {
    let lookup = |name: &str| std::env::var(name).ok();

    let mut options = match find_config_file(work_dir) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading workspace options");
            let content = std::fs::read_to_string(&path)?;
            parse_options(&content, &lookup)?
        }
        None => WorkspaceOptions::default(),
    };
    options.work_dir = work_dir.to_path_buf();

    Ok(apply_env_overrides(options, &lookup))
}

fn find_config_file(work_dir: &Path) -> Option<PathBuf> {
    let project_config = work_dir.join(".strata.toml");
    if project_config.exists() {
        return Some(project_config);
    }
    get_user_config_path().filter(|path| path.exists())
}

/// Get user config directory path
fn get_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strata").join("config.toml"))
}

/// Parse TOML and expand `${VAR}` in string values
fn parse_options<F>(content: &str, lookup: &F) -> Result<WorkspaceOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut options: WorkspaceOptions = toml::from_str(content)?;

    let expand = |s: &str| expand_string(s, lookup);
    options.home = options
        .home
        .map(|home| PathBuf::from(expand(&home.to_string_lossy())));
    options.project = options.project.as_deref().map(expand);
    options.backend.url = options.backend.url.as_deref().map(expand);
    options.engine.binary = expand(&options.engine.binary);
    for value in options.engine.env.values_mut() {
        *value = expand(value);
    }
    options.secrets.passphrase = options.secrets.passphrase.as_deref().map(expand);

    Ok(options)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"))
}

/// Expand environment variables in a single string; unknown vars stay as-is
fn expand_string<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_var_pattern()
        .replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
        })
        .to_string()
}

/// Apply environment variable overrides
///
/// - STRATA_BACKEND_URL -> backend.url (and kind = file)
/// - STRATA_CONFIG_PASSPHRASE -> secrets.passphrase
/// - STRATA_HOME -> home
/// - STRATA_ENGINE -> engine.binary
fn apply_env_overrides<F>(mut options: WorkspaceOptions, lookup: &F) -> WorkspaceOptions
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(url) = non_empty("STRATA_BACKEND_URL") {
        options.backend.kind = BackendKind::File;
        options.backend.url = Some(url);
    }
    if let Some(passphrase) = non_empty("STRATA_CONFIG_PASSPHRASE") {
        options.secrets.passphrase = Some(passphrase);
    }
    if let Some(home) = non_empty("STRATA_HOME") {
        options.home = Some(PathBuf::from(home));
    }
    if let Some(binary) = non_empty("STRATA_ENGINE") {
        options.engine.binary = binary;
    }

    options
}

/// Create a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Strata Configuration
# Place this file in your project root as .strata.toml
# or in ~/.config/strata/config.toml for global settings

# Project name for a fresh work dir (Strata.toml wins once it exists)
project = "my-infra"

[backend]
# file: snapshots under a local directory; engine: delegate to the engine CLI
kind = "file"
url = "file://${HOME}/.strata/stacks"

[engine]
binary = "strata-engine"

[engine.env]
AWS_REGION = "${AWS_REGION}"

[secrets]
provider = "passphrase"
passphrase = "${STRATA_CONFIG_PASSPHRASE}"
"#
}
