//! Settings persistence layer
//!
//! Handles loading and saving project settings, stack settings and the
//! local stack registry within a work dir.

use super::types::{ProjectSettings, StackSettings};
use crate::error::{Result, StrataError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Project settings file names, in lookup order
const PROJECT_FILES: [&str; 2] = ["Strata.toml", "Strata.json"];

/// Directory for workspace-private state inside the work dir
const STATE_DIR: &str = ".strata";

/// Storage backend for settings documents
#[derive(Debug, Clone)]
pub struct SettingsStorage {
    /// Root of the project
    work_dir: PathBuf,
}

impl SettingsStorage {
    /// Create a storage rooted at the given work dir
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    // ========== Project settings ==========

    /// Path of the existing project settings file, if any
    pub fn project_settings_path(&self) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| self.work_dir.join(name))
            .find(|path| path.exists())
    }

    /// Load project settings; `None` when the work dir has no project yet
    pub fn load_project(&self) -> Result<Option<ProjectSettings>> {
        match self.project_settings_path() {
            Some(path) => read_document(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Save project settings.
    ///
    /// Fails with `ProjectMismatch` if the file on disk names another project.
    pub fn save_project(&self, settings: &ProjectSettings) -> Result<()> {
        if let Some(existing) = self.load_project()? {
            if existing.name != settings.name {
                return Err(StrataError::ProjectMismatch {
                    expected: existing.name,
                    found: settings.name.clone(),
                });
            }
        }

        let path = self
            .project_settings_path()
            .unwrap_or_else(|| self.work_dir.join(PROJECT_FILES[0]));
        write_document(&path, settings)
    }

    // ========== Stack settings ==========

    /// Path of a stack's settings file (existing JSON wins over TOML)
    pub fn stack_settings_path(&self, stack: &str) -> PathBuf {
        let json = self.work_dir.join(format!("Strata.{}.json", stack));
        if json.exists() {
            return json;
        }
        self.work_dir.join(format!("Strata.{}.toml", stack))
    }

    /// Load a stack's settings; defaults when the file does not exist
    pub fn load_stack(&self, stack: &str) -> Result<StackSettings> {
        let path = self.stack_settings_path(stack);
        if !path.exists() {
            return Ok(StackSettings::default());
        }
        read_document(&path)
    }

    /// Save a stack's settings
    pub fn save_stack(&self, stack: &str, settings: &StackSettings) -> Result<()> {
        write_document(&self.stack_settings_path(stack), settings)
    }

    /// Delete a stack's settings file (missing file is fine)
    pub fn remove_stack(&self, stack: &str) -> Result<()> {
        let path = self.stack_settings_path(stack);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StrataError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to remove stack settings {}: {}", path.display(), e),
            ))),
        }
    }

    // ========== Local stack registry ==========

    /// Path of the local stack registry
    pub fn registry_path(&self) -> PathBuf {
        self.work_dir.join(STATE_DIR).join("workspace.json")
    }

    /// Load the registry document; `None` when absent
    pub fn load_registry<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    /// Save the registry document
    pub fn save_registry<T: Serialize>(&self, registry: &T) -> Result<()> {
        write_document(&self.registry_path(), registry)
    }
}

/// Read a TOML or JSON document, chosen by extension
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        StrataError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {}: {}", path.display(), e),
        ))
    })?;

    if is_toml(path) {
        toml::from_str(&content)
            .map_err(|e| StrataError::config(format!("Failed to parse {}: {}", path.display(), e)))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| StrataError::config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Write a TOML or JSON document atomically via a temp file
fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                StrataError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {}: {}", parent.display(), e),
                ))
            })?;
        }
    }

    let content = if is_toml(path) {
        toml::to_string_pretty(value)
            .map_err(|e| StrataError::Serialization(format!("Failed to serialize TOML: {}", e)))?
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| StrataError::Serialization(format!("Failed to serialize JSON: {}", e)))?
    };

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, &content).map_err(|e| {
        StrataError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", temp_path.display(), e),
        ))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        StrataError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to save {}: {}", path.display(), e),
        ))
    })?;

    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_roundtrip_and_mismatch() {
        let dir = TempDir::new().unwrap();
        let storage = SettingsStorage::new(dir.path());

        assert!(storage.load_project().unwrap().is_none());

        let settings = ProjectSettings::new("infra");
        storage.save_project(&settings).unwrap();
        assert_eq!(storage.load_project().unwrap(), Some(settings.clone()));
        assert!(dir.path().join("Strata.toml").exists());

        let mut renamed = settings.clone();
        renamed.description = Some("updated".into());
        storage.save_project(&renamed).unwrap();

        let err = storage
            .save_project(&ProjectSettings::new("other"))
            .unwrap_err();
        assert!(matches!(
            err,
            StrataError::ProjectMismatch { ref expected, ref found }
                if expected == "infra" && found == "other"
        ));
        assert_eq!(storage.load_project().unwrap(), Some(renamed));
    }

    #[test]
    fn test_stack_settings_default_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = SettingsStorage::new(dir.path());

        assert_eq!(storage.load_stack("dev").unwrap(), StackSettings::default());
        assert!(!dir.path().join("Strata.dev.toml").exists());

        let mut settings = StackSettings::default();
        settings.tags.insert("owner".into(), "me".into());
        storage.save_stack("dev", &settings).unwrap();
        assert!(dir.path().join("Strata.dev.toml").exists());
        assert_eq!(storage.load_stack("dev").unwrap(), settings);

        storage.remove_stack("dev").unwrap();
        storage.remove_stack("dev").unwrap();
        assert!(!dir.path().join("Strata.dev.toml").exists());
    }

    #[test]
    fn test_json_stack_settings_preferred() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Strata.prod.json"),
            r#"{"tags":{"tier":"gold"}}"#,
        )
        .unwrap();
        let storage = SettingsStorage::new(dir.path());
        let settings = storage.load_stack("prod").unwrap();
        assert_eq!(settings.tags["tier"], "gold");
    }
}
