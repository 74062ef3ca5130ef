//! WorkspaceManager - Central coordinator for a project's stacks
//!
//! Owns the config and tag stores, the local stack registry, the state
//! backend and the engine executor, and keeps project and stack settings on
//! disk in sync with them.

use super::locks::{CancelToken, StackLocks};
use super::registry::StackRegistry;
use super::types::{RemoveOptions, UpdateContext, UpdateOutcome, UpdateSummary};
use crate::backend::{EngineBackend, FileBackend, SharedBackend, StackRecord};
use crate::config::{BackendKind, SecretsOptions, WorkspaceOptions};
use crate::error::{Result, StrataError};
use crate::exec::{CommandOptions, CommandRequest, ProcessExecutor, SharedExecutor};
use crate::secrets::{PassphraseSecretsProvider, SecretsConfig, SharedSecretsProvider, PASSPHRASE_PROVIDER};
use crate::settings::{ProjectSettings, SettingsStorage, StackSettings};
use crate::stack_config::{ConfigMap, ConfigStore, ConfigValue};
use crate::state::{Deployment, StateCodec};
use crate::tags::{TagMap, TagStore};
use crate::types::{OutputMap, PluginInfo, StackName, StackSummary, WhoAmIResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Manages the stacks of one project
pub struct WorkspaceManager {
    options: WorkspaceOptions,

    /// Project settings (mirrors `Strata.toml`)
    project: RwLock<ProjectSettings>,

    /// Settings files
    storage: Arc<SettingsStorage>,

    /// Local stack references (persistent)
    registry: RwLock<StackRegistry>,

    backend: SharedBackend,

    executor: SharedExecutor,

    secrets: SharedSecretsProvider,

    config: ConfigStore,

    tags: TagStore,

    locks: StackLocks,
}

impl WorkspaceManager {
    /// Open a workspace, choosing backend, executor and secrets provider
    /// from the options
    pub fn open(options: WorkspaceOptions) -> Result<Self> {
        let executor: SharedExecutor = Arc::new(ProcessExecutor::new(&options.engine.binary));
        let backend: SharedBackend = match options.backend.kind {
            BackendKind::File => Arc::new(FileBackend::new(options.file_backend_root())),
            BackendKind::Engine => Arc::new(EngineBackend::new(
                executor.clone(),
                options.command_options(),
            )),
        };
        let secrets = secrets_provider(&options.secrets)?;
        Self::with_components(options, backend, executor, secrets)
    }

    /// Open with explicit components (for testing and embedding)
    pub fn with_components(
        options: WorkspaceOptions,
        backend: SharedBackend,
        executor: SharedExecutor,
        secrets: SharedSecretsProvider,
    ) -> Result<Self> {
        let storage = Arc::new(SettingsStorage::new(&options.work_dir));

        let project = match storage.load_project()? {
            Some(project) => project,
            None => {
                let name = options.project.clone().ok_or_else(|| {
                    StrataError::config(format!(
                        "{} has no Strata.toml and no project name is configured",
                        options.work_dir.display()
                    ))
                })?;
                let project = ProjectSettings::new(name);
                storage.save_project(&project)?;
                tracing::info!(project = %project.name, "initialized project settings");
                project
            }
        };

        let registry = storage.load_registry::<StackRegistry>()?.unwrap_or_default();
        let config = ConfigStore::new(project.name.clone(), storage.clone(), secrets.clone());
        let tags = TagStore::new(storage.clone());

        tracing::debug!(
            project = %project.name,
            backend = backend.kind(),
            "opened workspace"
        );

        Ok(Self {
            options,
            project: RwLock::new(project),
            storage,
            registry: RwLock::new(registry),
            backend,
            executor,
            secrets,
            config,
            tags,
            locks: StackLocks::new(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.options.work_dir
    }

    pub fn options(&self) -> &WorkspaceOptions {
        &self.options
    }

    /// Name of the project this workspace holds
    pub fn project_name(&self) -> String {
        self.project.read().name.clone()
    }

    // ========== Stack lifecycle ==========

    /// Create a stack and select it
    pub fn create_stack(&self, name: &str) -> Result<StackSummary> {
        StackName::new(name)?;
        let project = self.project_name();
        if self.backend.stack_exists(&project, name)? {
            return Err(StrataError::already_exists(format!("stack '{}'", name)));
        }

        // Preserved settings from an earlier stack of this name keep their salt
        let mut settings = self.storage.load_stack(name)?;
        let secrets = match settings.secrets_config() {
            Some(secrets) => secrets,
            None => self.secrets.new_config()?,
        };

        let snapshot = Deployment::empty_snapshot(&secrets);
        self.backend
            .create_stack(&project, name, &StateCodec::encode(&snapshot)?)?;

        settings.set_secrets_config(&secrets);
        self.storage.save_stack(name, &settings)?;

        self.registry.write().select(name);
        self.save_registry()?;

        self.config.detach(name);
        self.tags.detach(name);

        tracing::info!(stack = name, backend = self.backend.kind(), "created stack");
        self.summary(name)
    }

    /// Make a stack the current one
    pub fn select_stack(&self, name: &str) -> Result<()> {
        StackName::new(name)?;
        self.require_stack(name)?;

        self.registry.write().select(name);
        self.save_registry()?;

        tracing::info!(stack = name, "selected stack");
        Ok(())
    }

    /// Remove a stack from the backend and the local registry
    pub fn remove_stack(&self, name: &str, options: RemoveOptions) -> Result<()> {
        StackName::new(name)?;
        self.require_stack(name)?;
        if !options.force {
            self.ensure_attached(name)?;
        }
        let _guard = self.locks.mutation(name)?;

        if !options.force {
            if self.config.is_dirty(name)? {
                return Err(StrataError::dirty_state(format!(
                    "stack '{}' has config changes that were never applied; refresh or force removal",
                    name
                )));
            }
            let resources = self.load_snapshot(name)?.resource_count();
            if resources > 0 {
                return Err(StrataError::dirty_state(format!(
                    "stack '{}' still has {} resources; destroy them or force removal",
                    name, resources
                )));
            }
        }

        self.backend.remove_stack(&self.project_name(), name)?;

        self.registry.write().remove(name);
        self.save_registry()?;

        self.config.detach(name);
        self.tags.detach(name);
        if !options.preserve_config {
            self.storage.remove_stack(name)?;
        }

        tracing::info!(
            stack = name,
            force = options.force,
            preserve_config = options.preserve_config,
            "removed stack"
        );
        Ok(())
    }

    /// List stacks.
    ///
    /// Without `include_all` this is the local registry for this project,
    /// enriched with backend data where the backend has it. With
    /// `include_all` it is the backend's list across every project.
    pub fn list_stacks(&self, include_all: bool) -> Result<Vec<StackSummary>> {
        let project = self.project_name();
        let current = self.registry.read().current.clone();

        if include_all {
            let records = self.backend.list_stacks(None)?;
            return Ok(records
                .into_iter()
                .map(|record| {
                    let local = record.project == project;
                    let name = if local {
                        record.name.clone()
                    } else {
                        format!("{}/{}", record.project, record.name)
                    };
                    let is_current = local && current.as_deref() == Some(record.name.as_str());
                    self.to_summary(name, is_current, Some(&record))
                })
                .collect());
        }

        let records: HashMap<String, StackRecord> = self
            .backend
            .list_stacks(Some(&project))?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let registry = self.registry.read();
        Ok(registry
            .names()
            .map(|name| {
                let is_current = current.as_deref() == Some(name);
                self.to_summary(name.to_string(), is_current, records.get(name))
            })
            .collect())
    }

    /// Summary of the current stack, if one is selected
    pub fn stack(&self) -> Result<Option<StackSummary>> {
        let Some(current) = self.registry.read().current.clone() else {
            return Ok(None);
        };
        Ok(self
            .list_stacks(false)?
            .into_iter()
            .find(|summary| summary.name == current))
    }

    // ========== Config ==========

    pub fn get_config(&self, stack: &str, key: &str, path: bool) -> Result<ConfigValue> {
        self.ensure_attached(stack)?;
        self.config.get(stack, key, path)
    }

    pub fn get_all_config(&self, stack: &str) -> Result<ConfigMap> {
        self.ensure_attached(stack)?;
        self.config.get_all(stack)
    }

    pub fn set_config(&self, stack: &str, key: &str, value: ConfigValue, path: bool) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.config.set(stack, key, value, path)
    }

    /// Set every entry, or none of them
    pub fn set_all_config(&self, stack: &str, values: &ConfigMap, path: bool) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.config.set_all(stack, values, path)
    }

    pub fn remove_config(&self, stack: &str, key: &str, path: bool) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.config.remove(stack, key, path)
    }

    /// Remove every key, or none of them
    pub fn remove_all_config(&self, stack: &str, keys: &[String], path: bool) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.config.remove_all(stack, keys, path)
    }

    /// Discard local config edits in favour of the last applied config
    pub fn refresh_config(&self, stack: &str) -> Result<ConfigMap> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.config.refresh(stack)?;
        self.config.get_all(stack)
    }

    // ========== Tags ==========

    pub fn get_tag(&self, stack: &str, key: &str) -> Result<String> {
        self.ensure_attached(stack)?;
        self.tags.get(stack, key)
    }

    pub fn list_tags(&self, stack: &str) -> Result<TagMap> {
        self.ensure_attached(stack)?;
        self.tags.list(stack)
    }

    pub fn set_tag(&self, stack: &str, key: &str, value: &str) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.tags.set(stack, key, value)
    }

    pub fn remove_tag(&self, stack: &str, key: &str) -> Result<()> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.tags.remove(stack, key)
    }

    // ========== State import/export ==========

    /// Stored snapshot with the stack's current working config
    pub fn export_stack(&self, stack: &str) -> Result<Deployment> {
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;

        let mut snapshot = StateCodec::upgrade(self.load_snapshot(stack)?)?;
        snapshot.set_config(self.config.persisted(stack)?);
        snapshot.set_secrets_config(&self.config.secrets_config(stack)?);

        tracing::debug!(stack, resources = snapshot.resource_count(), "exported stack");
        Ok(snapshot)
    }

    /// Replace a stack's state and config with a deployment document.
    ///
    /// Secrets in the document are re-encrypted for the target stack.
    /// Nothing changes unless every step succeeds.
    pub fn import_stack(&self, stack: &str, deployment: &Deployment) -> Result<()> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        self.ensure_attached(stack)?;
        let _guard = self.locks.mutation(stack)?;

        let bytes = StateCodec::encode(deployment)?;
        let mut snapshot = StateCodec::upgrade(StateCodec::decode(&bytes)?)?;

        let target_secrets = self.config.secrets_config(stack)?;
        let source_secrets = snapshot
            .secrets_config()
            .unwrap_or_else(|| target_secrets.clone());
        let config = self.config.decode(&snapshot.config(), &source_secrets)?;

        let (working, applied) = self.config.checkpoint(stack)?;
        self.config.replace(stack, config)?;

        let saved = self
            .config
            .persisted(stack)
            .and_then(|persisted| {
                snapshot.set_config(persisted);
                snapshot.set_secrets_config(&target_secrets);
                self.save_snapshot(stack, &snapshot)
            });
        if let Err(e) = saved {
            if let Err(restore_err) = self.config.restore(stack, working, applied) {
                tracing::warn!(stack, error = %restore_err, "failed to restore config after import error");
            }
            return Err(e);
        }

        tracing::info!(stack, resources = snapshot.resource_count(), "imported stack");
        Ok(())
    }

    /// Import a serialized deployment document.
    ///
    /// The stack is checked before the document is decoded, so a missing
    /// stack is `NotFound` whatever the bytes hold.
    pub fn import_stack_document(&self, stack: &str, bytes: &[u8]) -> Result<()> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        let deployment = StateCodec::decode(bytes)?;
        self.import_stack(stack, &deployment)
    }

    // ========== Updates ==========

    /// Run a long-running operation against a stack.
    ///
    /// The stack is `Updating` for the whole call, so config and tag
    /// mutations fail with `Conflict` meanwhile. `cancel` is checked before
    /// `op` starts and after it returns, never during. On success the
    /// working config is recorded as applied.
    pub fn update<F>(&self, stack: &str, cancel: &CancelToken, op: F) -> Result<UpdateSummary>
    where
        F: FnOnce(&UpdateContext) -> Result<UpdateOutcome>,
    {
        self.ensure_attached(stack)?;
        let _update = self.locks.begin_update(stack)?;

        let id = Uuid::new_v4();
        let started = Utc::now();
        cancel.check("before update")?;

        tracing::info!(stack, update_id = %id, "update started");
        let context = UpdateContext {
            id,
            stack: stack.to_string(),
            config: self.config.get_all(stack)?,
            options: self.command_options(),
        };
        let outcome = op(&context)?;
        cancel.check("after update")?;

        let mut snapshot = StateCodec::upgrade(self.load_snapshot(stack)?)?;
        snapshot.set_config(self.config.persisted(stack)?);
        snapshot.set_secrets_config(&self.config.secrets_config(stack)?);
        if let Some(resources) = outcome.resources {
            snapshot.set_resources(resources);
        }
        if let Some(outputs) = outcome.outputs {
            snapshot.set_outputs(outputs);
        }
        let finished = Utc::now();
        snapshot.stamp_manifest(finished);
        self.save_snapshot(stack, &snapshot)?;
        self.config.mark_applied(stack)?;

        tracing::info!(stack, update_id = %id, resources = snapshot.resource_count(), "update finished");
        Ok(UpdateSummary {
            id,
            stack: stack.to_string(),
            started,
            finished,
            resource_count: snapshot.resource_count(),
        })
    }

    /// Run `<engine> <verb> <args> --stack <stack>` as an update.
    ///
    /// If the engine prints a JSON object with `resources`/`outputs`, those
    /// are recorded in the snapshot. Empty stdout records nothing; anything
    /// else that does not parse fails the update.
    pub fn engine_update(
        &self,
        stack: &str,
        verb: &[&str],
        args: &[String],
        cancel: &CancelToken,
    ) -> Result<UpdateSummary> {
        let executor = self.executor.clone();
        self.update(stack, cancel, |context| {
            let request = CommandRequest::new(verb, &context.options)
                .args(args.iter().cloned())
                .stack(&context.stack);
            let output = executor.run(&request)?;
            if output.stdout.trim().is_empty() {
                return Ok(UpdateOutcome::default());
            }
            Ok(serde_json::from_str::<UpdateOutcome>(&output.stdout)?)
        })
    }

    /// Outputs recorded in the stack's snapshot
    pub fn stack_outputs(&self, stack: &str) -> Result<OutputMap> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        Ok(self.load_snapshot(stack)?.outputs())
    }

    // ========== Settings ==========

    pub fn project_settings(&self) -> ProjectSettings {
        self.project.read().clone()
    }

    /// Save project settings; `ProjectMismatch` if the name changes
    pub fn save_project_settings(&self, settings: &ProjectSettings) -> Result<()> {
        self.storage.save_project(settings)?;
        *self.project.write() = settings.clone();
        Ok(())
    }

    pub fn stack_settings(&self, stack: &str) -> Result<StackSettings> {
        StackName::new(stack)?;
        self.storage.load_stack(stack)
    }

    /// Replace a stack's settings file; the stores reload it on next use
    pub fn save_stack_settings(&self, stack: &str, settings: &StackSettings) -> Result<()> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        let _guard = self.locks.mutation(stack)?;
        self.storage.save_stack(stack, settings)?;
        self.config.detach(stack);
        self.tags.detach(stack);
        Ok(())
    }

    // ========== Environments ==========

    /// Append environments to the stack's import list (duplicates skipped)
    pub fn add_environments(&self, stack: &str, environments: &[String]) -> Result<()> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        let _guard = self.locks.mutation(stack)?;

        let mut settings = self.storage.load_stack(stack)?;
        for environment in environments {
            if !settings.environments.contains(environment) {
                settings.environments.push(environment.clone());
            }
        }
        self.storage.save_stack(stack, &settings)
    }

    pub fn list_environments(&self, stack: &str) -> Result<Vec<String>> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        Ok(self.storage.load_stack(stack)?.environments)
    }

    /// Remove an environment from the import list; missing is a no-op
    pub fn remove_environment(&self, stack: &str, environment: &str) -> Result<()> {
        StackName::new(stack)?;
        self.require_stack(stack)?;
        let _guard = self.locks.mutation(stack)?;

        let mut settings = self.storage.load_stack(stack)?;
        let before = settings.environments.len();
        settings.environments.retain(|e| e != environment);
        if settings.environments.len() == before {
            return Ok(());
        }
        self.storage.save_stack(stack, &settings)
    }

    // ========== Engine pass-throughs ==========

    pub fn who_am_i(&self) -> Result<WhoAmIResult> {
        let output = self
            .executor
            .run(&self.engine_request(&["whoami"]).arg("--json"))?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    pub fn list_plugins(&self) -> Result<Vec<PluginInfo>> {
        let output = self
            .executor
            .run(&self.engine_request(&["plugin", "ls"]).arg("--json"))?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    pub fn install_plugin(&self, name: &str, version: &str, kind: &str) -> Result<()> {
        self.executor
            .run(&self.engine_request(&["plugin", "install"]).args([kind, name, version]))?;
        Ok(())
    }

    pub fn install_plugin_from_server(&self, name: &str, version: &str, server: &str) -> Result<()> {
        self.executor.run(
            &self
                .engine_request(&["plugin", "install"])
                .args(["resource", name, version, "--server", server]),
        )?;
        Ok(())
    }

    /// Remove plugins matching kind, and optionally name and version range
    pub fn remove_plugin(
        &self,
        name: Option<&str>,
        version_range: Option<&str>,
        kind: &str,
    ) -> Result<()> {
        let mut request = self.engine_request(&["plugin", "rm"]).arg(kind);
        if let Some(name) = name {
            request = request.arg(name);
            if let Some(range) = version_range {
                request = request.arg(range);
            }
        }
        self.executor.run(&request.arg("--yes"))?;
        Ok(())
    }

    // ========== Helpers ==========

    fn command_options(&self) -> CommandOptions {
        self.options.command_options()
    }

    fn engine_request(&self, verb: &[&str]) -> CommandRequest {
        CommandRequest::new(verb, &self.command_options())
    }

    fn require_stack(&self, name: &str) -> Result<()> {
        if !self.backend.stack_exists(&self.project_name(), name)? {
            return Err(StrataError::not_found(format!("stack '{}'", name)));
        }
        Ok(())
    }

    /// Load the stack's config and tags into the stores if not yet loaded
    fn ensure_attached(&self, name: &str) -> Result<()> {
        StackName::new(name)?;
        if self.config.is_attached(name) && self.tags.is_attached(name) {
            return Ok(());
        }
        self.require_stack(name)?;
        let snapshot = self.load_snapshot(name)?;

        let mut settings = self.storage.load_stack(name)?;
        let secrets = match settings.secrets_config() {
            Some(secrets) => secrets,
            None => {
                let secrets = match snapshot.secrets_config() {
                    Some(secrets) => secrets,
                    None => self.secrets.new_config()?,
                };
                settings.set_secrets_config(&secrets);
                self.storage.save_stack(name, &settings)?;
                secrets
            }
        };
        if secrets.provider != self.secrets.id() {
            return Err(StrataError::config(format!(
                "stack '{}' uses secrets provider '{}' but the workspace is configured for '{}'",
                name,
                secrets.provider,
                self.secrets.id()
            )));
        }

        let snapshot_secrets: SecretsConfig = snapshot
            .secrets_config()
            .unwrap_or_else(|| secrets.clone());
        let applied = self.config.decode(&snapshot.config(), &snapshot_secrets)?;

        self.config.attach(name, secrets, applied)?;
        self.tags.attach(name)?;
        Ok(())
    }

    fn load_snapshot(&self, name: &str) -> Result<Deployment> {
        let bytes = self.backend.load_snapshot(&self.project_name(), name)?;
        StateCodec::decode(&bytes)
    }

    fn save_snapshot(&self, name: &str, snapshot: &Deployment) -> Result<()> {
        let bytes = StateCodec::encode(snapshot)?;
        self.backend
            .save_snapshot(&self.project_name(), name, &bytes)
    }

    fn summary(&self, name: &str) -> Result<StackSummary> {
        self.list_stacks(false)?
            .into_iter()
            .find(|summary| summary.name == name)
            .ok_or_else(|| StrataError::not_found(format!("stack '{}'", name)))
    }

    fn to_summary(&self, name: String, current: bool, record: Option<&StackRecord>) -> StackSummary {
        let updating = self.locks.is_updating(&name);
        StackSummary {
            current,
            update_in_progress: Some(updating || record.map_or(false, |r| r.update_in_progress)),
            last_update: record.and_then(|r| r.last_update),
            resource_count: record.and_then(|r| r.resource_count),
            url: record.and_then(|r| r.url.clone()),
            name,
        }
    }

    /// Save registry to disk
    fn save_registry(&self) -> Result<()> {
        let registry = self.registry.read();
        self.storage.save_registry(&*registry)
    }
}

/// Build the secrets provider named in the options
fn secrets_provider(options: &SecretsOptions) -> Result<SharedSecretsProvider> {
    if options.provider != PASSPHRASE_PROVIDER {
        return Err(StrataError::config(format!(
            "unsupported secrets provider '{}'",
            options.provider
        )));
    }
    let mut provider = match &options.passphrase {
        Some(passphrase) => PassphraseSecretsProvider::new(passphrase.clone()),
        None => PassphraseSecretsProvider::unconfigured(),
    };
    if let Some(iterations) = options.iterations {
        provider = provider.with_iterations(iterations);
    }
    Ok(Arc::new(provider))
}
