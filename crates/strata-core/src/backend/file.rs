//! Local directory backend
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├── <project>/
//! │   ├── dev.json
//! │   └── prod.json
//! └── <other-project>/
//!     └── dev.json
//! ```

use super::{StackRecord, StateBackend};
use crate::error::{Result, StrataError};
use crate::state::StateCodec;
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_EXT: &str = "json";

/// Backend storing one snapshot file per stack
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from a `file://` URL or a plain path
    pub fn from_url(url: &str) -> Self {
        Self::new(url.strip_prefix("file://").unwrap_or(url))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, project: &str, stack: &str) -> PathBuf {
        self.root
            .join(project)
            .join(format!("{}.{}", stack, SNAPSHOT_EXT))
    }

    /// Build a record from a snapshot file; unreadable snapshots still list
    fn record(&self, project: &str, stack: &str, path: &Path) -> StackRecord {
        let snapshot = fs::read(path)
            .ok()
            .and_then(|bytes| StateCodec::decode(&bytes).ok());
        StackRecord {
            project: project.to_string(),
            name: stack.to_string(),
            last_update: snapshot
                .as_ref()
                .and_then(|s| s.manifest())
                .map(|m| m.time),
            update_in_progress: false,
            resource_count: snapshot.as_ref().map(|s| s.resource_count() as u64),
            url: Some(format!("file://{}", path.display())),
        }
    }

    fn list_project(&self, project: &str, out: &mut Vec<StackRecord>) -> Result<()> {
        let dir = self.root.join(project);
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != SNAPSHOT_EXT) {
                continue;
            }
            if let Some(stack) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(self.record(project, stack, &path));
            }
        }
        Ok(())
    }

    fn write_atomic(path: &Path, document: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, document).map_err(|e| {
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
}

impl StateBackend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn list_stacks(&self, project: Option<&str>) -> Result<Vec<StackRecord>> {
        let mut records = Vec::new();
        match project {
            Some(project) => self.list_project(project, &mut records)?,
            None => {
                if self.root.is_dir() {
                    for entry in fs::read_dir(&self.root)? {
                        let entry = entry?;
                        if !entry.file_type()?.is_dir() {
                            continue;
                        }
                        if let Some(project) = entry.file_name().to_str() {
                            self.list_project(project, &mut records)?;
                        }
                    }
                }
            }
        }
        records.sort_by(|a, b| (&a.project, &a.name).cmp(&(&b.project, &b.name)));
        Ok(records)
    }

    fn stack_exists(&self, project: &str, stack: &str) -> Result<bool> {
        Ok(self.snapshot_path(project, stack).is_file())
    }

    fn create_stack(&self, project: &str, stack: &str, initial: &[u8]) -> Result<()> {
        let path = self.snapshot_path(project, stack);
        if path.exists() {
            return Err(StrataError::already_exists(format!(
                "stack '{}' in project '{}'",
                stack, project
            )));
        }
        Self::write_atomic(&path, initial)
    }

    fn remove_stack(&self, project: &str, stack: &str) -> Result<()> {
        let path = self.snapshot_path(project, stack);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StrataError::not_found(
                format!("stack '{}' in project '{}'", stack, project),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn load_snapshot(&self, project: &str, stack: &str) -> Result<Vec<u8>> {
        let path = self.snapshot_path(project, stack);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StrataError::not_found(
                format!("stack '{}' in project '{}'", stack, project),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn save_snapshot(&self, project: &str, stack: &str, document: &[u8]) -> Result<()> {
        let path = self.snapshot_path(project, stack);
        if !path.exists() {
            return Err(StrataError::not_found(format!(
                "stack '{}' in project '{}'",
                stack, project
            )));
        }
        Self::write_atomic(&path, document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretsConfig;
    use crate::state::Deployment;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn initial() -> Vec<u8> {
        let secrets = SecretsConfig {
            provider: "passphrase".into(),
            salt: Some("c2FsdA==".into()),
        };
        StateCodec::encode(&Deployment::empty_snapshot(&secrets)).unwrap()
    }

    #[test]
    fn test_create_list_remove() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());

        backend.create_stack("app", "dev", &initial()).unwrap();
        backend.create_stack("app", "prod", &initial()).unwrap();
        backend.create_stack("other", "dev", &initial()).unwrap();

        let names: Vec<_> = backend
            .list_stacks(Some("app"))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["dev", "prod"]);
        assert_eq!(backend.list_stacks(None).unwrap().len(), 3);

        let record = &backend.list_stacks(Some("other")).unwrap()[0];
        assert_eq!(record.resource_count, Some(0));
        assert!(record.last_update.is_some());

        backend.remove_stack("app", "dev").unwrap();
        assert!(!backend.stack_exists("app", "dev").unwrap());
        assert!(backend.remove_stack("app", "dev").unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_create_fails() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.create_stack("app", "dev", &initial()).unwrap();
        assert!(matches!(
            backend.create_stack("app", "dev", &initial()),
            Err(StrataError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_snapshot_save_requires_stack() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::from_url(&format!("file://{}", dir.path().display()));
        assert!(backend.save_snapshot("app", "dev", b"{}").is_err());
        assert!(backend.load_snapshot("app", "dev").unwrap_err().is_not_found());

        backend.create_stack("app", "dev", b"{}").unwrap();
        backend.save_snapshot("app", "dev", b"{\"v\":1}").unwrap();
        assert_eq!(backend.load_snapshot("app", "dev").unwrap(), b"{\"v\":1}");
        assert_eq!(backend.list_stacks(Some("app")).unwrap()[0].resource_count, None);
    }
}
